pub mod app;
pub mod catalog;
pub mod events;
pub mod settings;
pub mod update;

pub use app::*;
pub use catalog::*;
pub use events::*;
pub use settings::*;
pub use update::*;
