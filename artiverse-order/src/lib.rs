pub mod cart;
pub mod checkout;
pub mod manager;
pub mod models;
pub mod reporting;

pub use cart::{Cart, CartIssue, CartLine, PricedCart, PricedLine};
pub use checkout::{Address, CheckoutRequest, CustomerInfo};
pub use manager::{OrderError, OrderManager};
pub use models::{Order, OrderChange, OrderItem, OrderStatus, PaymentStatus};
pub use reporting::{BestSeller, DailyRevenue, SalesReport};
