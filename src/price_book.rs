//! Price-indexed ordered book for one side of the market.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

/// A single resting price level. Immutable value object.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Order {
    pub price_level: f64,
    pub quantity: f64,
}

impl Order {
    /// Sentinel returned by `PriceBook::best` when the side is empty.
    pub const NONE: Order = Order {
        price_level: f64::NAN,
        quantity: f64::NAN,
    };
}

/// Which side of the book a `PriceBook` represents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

/// Ordered mapping from price to quantity for one side of the book.
///
/// Bids sort descending (best = highest price); asks sort ascending
/// (best = lowest price). Backed by a `BTreeMap` keyed on `OrderedFloat`
/// so both directions are O(log n) insert/remove and O(1) best-peek.
#[derive(Clone, Debug)]
pub struct PriceBook {
    levels: BTreeMap<OrderedFloat<f64>, f64>,
    side: Side,
}

impl PriceBook {
    pub fn new(side: Side) -> Self {
        Self {
            levels: BTreeMap::new(),
            side,
        }
    }

    /// Upsert `price` with `quantity`, or delete it if `quantity <= 0`.
    pub fn insert(&mut self, price: f64, quantity: f64) {
        let key = OrderedFloat(price);
        if quantity > 0.0 {
            self.levels.insert(key, quantity);
        } else {
            self.levels.remove(&key);
        }
    }

    /// Best entry in this side's ordering, or `Order::NONE` if empty.
    pub fn best(&self) -> Order {
        let entry = match self.side {
            Side::Bid => self.levels.iter().next_back(),
            Side::Ask => self.levels.iter().next(),
        };
        match entry {
            Some((price, &quantity)) => Order {
                price_level: price.0,
                quantity,
            },
            None => Order::NONE,
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn levels(&self) -> &BTreeMap<OrderedFloat<f64>, f64> {
        &self.levels
    }
}
