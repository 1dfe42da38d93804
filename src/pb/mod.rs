//! Vendored protobuf bindings for the Substreams protocol.
//!
//! The `.rs` files in this directory are generated from the upstream
//! `sf/substreams` protobuf definitions and checked in so that building the
//! crate does not require `protoc`. Only the subset of messages the sink
//! consumes is vendored.

#[allow(clippy::all, clippy::pedantic)]
pub mod sf {
    pub mod substreams {
        pub mod v1 {
            include!("sf.substreams.v1.rs");
        }

        pub mod rpc {
            pub mod v2 {
                include!("sf.substreams.rpc.v2.rs");
            }
        }
    }
}
