pub mod contact;
pub mod newsletter;
pub mod orders;
pub mod products;
pub mod stock_alerts;
pub mod users;
