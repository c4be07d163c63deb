pub mod dispatch;
pub mod item;
pub mod stress;
