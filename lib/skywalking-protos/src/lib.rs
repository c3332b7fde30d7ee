//! SkyWalking data-collect protocol definitions.
#![deny(warnings)]
#![allow(clippy::enum_variant_names)]
mod skywalking_include {
    include!(concat!(env!("OUT_DIR"), "/skywalking.mod.rs"));
}

pub use skywalking_include::*;
