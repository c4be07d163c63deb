//! Repository methods, implemented directly on [`StoreClient`](crate::StoreClient).

pub mod item;
