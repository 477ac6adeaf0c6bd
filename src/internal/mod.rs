pub mod export;
#[cfg(test)]
pub(crate) mod fixture;
pub mod models;
pub mod navigation;
pub mod notification;
pub mod paginate;
pub mod refresh;
pub mod thread;
pub mod tree;
pub mod ui;
