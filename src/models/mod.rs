mod checkout_session;
mod coupon;
mod product;
mod redemption;
mod reservation;

pub use checkout_session::*;
pub use coupon::*;
pub use product::*;
pub use redemption::*;
pub use reservation::*;
