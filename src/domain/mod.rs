pub mod instrument;
pub mod payment;
pub mod reservation;
pub mod user;

pub use instrument::*;
pub use payment::*;
pub use reservation::*;
pub use user::*;
