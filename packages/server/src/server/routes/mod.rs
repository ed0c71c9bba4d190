// HTTP routes
pub mod health;
pub mod logs;
pub mod news;
pub mod stream;
pub mod topics;

pub use health::*;
pub use logs::*;
pub use news::*;
pub use stream::*;
pub use topics::*;
