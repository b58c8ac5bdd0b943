pub mod server;
pub mod store;

pub use server::{FigureAsset, FigureServer, content_type_for};
pub use store::{FigureKey, FigureStore, now_secs};
