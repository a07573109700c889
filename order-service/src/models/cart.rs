use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One line of a user's pre-checkout basket. The unit price is captured when
/// the item is added; `subtotal` is always `quantity * unit_price`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
    pub cart_item_id: Uuid,
    pub cart_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl CartItem {
    pub fn new(cart_id: Uuid, menu_item_id: Uuid, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            cart_item_id: Uuid::new_v4(),
            cart_id,
            menu_item_id,
            quantity,
            unit_price,
            subtotal: unit_price * Decimal::from(quantity),
        }
    }

    /// Adding the same menu item again merges into the existing line.
    pub fn add_quantity(&mut self, additional: i32) {
        self.quantity += additional;
        self.subtotal = self.unit_price * Decimal::from(self.quantity);
    }
}

/// A user's mutable basket. Created lazily on first add, cleared (not
/// deleted) when checkout converts it into an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub cart_id: Uuid,
    pub user_id: Uuid,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            cart_id: Uuid::new_v4(),
            user_id,
            created_utc: now,
            updated_utc: now,
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(|item| item.subtotal).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn subtotal_tracks_quantity() {
        let cart = Cart::new(Uuid::new_v4());
        let mut item = CartItem::new(cart.cart_id, Uuid::new_v4(), 2, dec!(4.50));
        assert_eq!(item.subtotal, dec!(9.00));

        item.add_quantity(3);
        assert_eq!(item.quantity, 5);
        assert_eq!(item.subtotal, dec!(22.50));
    }

    #[test]
    fn cart_subtotal_sums_lines() {
        let mut cart = Cart::new(Uuid::new_v4());
        cart.items
            .push(CartItem::new(cart.cart_id, Uuid::new_v4(), 1, dec!(12.00)));
        cart.items
            .push(CartItem::new(cart.cart_id, Uuid::new_v4(), 3, dec!(2.50)));
        assert_eq!(cart.subtotal(), dec!(19.50));
    }
}
