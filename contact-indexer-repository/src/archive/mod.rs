//! Object store implementation of the archive store.
//!
//! Raw batches are written through the `object_store` crate, which gives an
//! S3 backend for production and an in-memory backend for tests.

mod object_store_archive;

pub use object_store_archive::ObjectStoreArchive;
