mod order;
mod payment;
mod product;

pub use order::*;
pub use payment::*;
pub use product::*;
