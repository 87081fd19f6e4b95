//! Checkout: delivery details, payment method and order placement.
//!
//! Payment providers are external. They plug in through [`PaymentProcessor`];
//! [`SimulatedPayment`] waits briefly and approves every charge.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::error::{CatalogError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    ApplePay,
    Card,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 2] = [PaymentMethod::ApplePay, PaymentMethod::Card];

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::ApplePay => "Apple Pay",
            PaymentMethod::Card => "Card",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Where the order goes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub name: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: String,
    pub city: String,
    #[serde(default)]
    pub instructions: String,
}

impl DeliveryDetails {
    /// Name, first address line and city are required.
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.address_line1, &self.city]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// Result of a successful charge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub amount: Decimal,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn charge(&self, amount: Decimal, method: PaymentMethod) -> Result<PaymentReceipt>;
}

/// Stand-in processor that approves every charge after a short delay.
#[derive(Debug, Clone)]
pub struct SimulatedPayment {
    delay: Duration,
}

impl SimulatedPayment {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedPayment {
    fn default() -> Self {
        Self::new(Duration::from_millis(600))
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedPayment {
    async fn charge(&self, amount: Decimal, method: PaymentMethod) -> Result<PaymentReceipt> {
        tokio::time::sleep(self.delay).await;
        tracing::info!("Simulated {} charge of {}", method, amount);
        Ok(PaymentReceipt {
            transaction_id: format!("sim-{}", uuid::Uuid::new_v4().simple()),
            amount,
        })
    }
}

/// A placed order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderConfirmation {
    pub receipt: PaymentReceipt,
    pub total_items: u64,
    pub payment_method: PaymentMethod,
    pub delivery: DeliveryDetails,
    /// RFC 3339 placement time.
    pub placed_at: String,
}

#[derive(Debug, Default)]
pub struct Checkout {
    pub delivery: DeliveryDetails,
    pub payment_method: PaymentMethod,
    processing: bool,
}

impl Checkout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn can_place_order(&self, cart: &Cart) -> bool {
        !self.processing && !cart.is_empty() && self.delivery.is_complete()
    }

    /// Charge the cart total and clear the cart.
    ///
    /// A failed charge leaves the cart as it was.
    pub async fn place_order(
        &mut self,
        cart: &mut Cart,
        processor: &dyn PaymentProcessor,
    ) -> Result<OrderConfirmation> {
        if self.processing {
            return Err(CatalogError::Checkout("an order is already being placed".into()));
        }
        if cart.is_empty() {
            return Err(CatalogError::Checkout("cart is empty".into()));
        }
        if !self.delivery.is_complete() {
            return Err(CatalogError::Checkout(
                "name, address and city are required".into(),
            ));
        }

        let amount = cart.total_price();
        let charged = {
            let _processing = Processing::start(&mut self.processing);
            processor.charge(amount, self.payment_method).await
        };

        let receipt = charged?;
        let confirmation = OrderConfirmation {
            receipt,
            total_items: cart.total_items(),
            payment_method: self.payment_method,
            delivery: self.delivery.clone(),
            placed_at: chrono::Utc::now().to_rfc3339(),
        };
        cart.clear();
        tracing::info!(
            "Order placed: {} items, {} via {}",
            confirmation.total_items,
            confirmation.receipt.amount,
            confirmation.payment_method
        );
        Ok(confirmation)
    }
}

/// Holds the in-progress flag for the length of a charge, including one
/// whose future is dropped before it completes.
struct Processing<'a>(&'a mut bool);

impl<'a> Processing<'a> {
    fn start(flag: &'a mut bool) -> Self {
        *flag = true;
        Self(flag)
    }
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}
