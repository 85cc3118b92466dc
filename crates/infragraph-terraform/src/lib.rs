//! Terraform renderer for infragraph
//!
//! This crate implements the `Target` trait by rendering the task graph as
//! a Terraform JSON configuration instead of calling a cloud API.
//!
//! # Output
//!
//! - `kubernetes.tf.json`: `locals`, `output`, `provider`, `resource` and
//!   `terraform` blocks, keys sorted, pretty-printed
//! - `data/<type>_<name>_<field>`: payloads such as instance user data,
//!   referenced from the document with `file()` / `filebase64()`
//!
//! Resources that already exist and are not managed by this run (any
//! lifecycle other than `Sync`) are left out; references to them render as
//! their discovered values.
//!
//! # Example
//!
//! ```ignore
//! use infragraph::{Executor, RunConfig};
//! use infragraph_terraform::{TerraformOptions, TerraformTarget};
//! use serde_json::json;
//!
//! let options = TerraformOptions::default()
//!     .with_provider("aws", json!({ "region": "us-test-1" }))
//!     .with_required_version(">= 0.15.0");
//! let executor = Executor::new(Arc::new(TerraformTarget::new(options)))
//!     .with_config(RunConfig::default().with_out_dir("out"));
//!
//! let report = executor.run(tasks).await?;
//! ```

pub mod error;
pub mod target;

pub use error::{Result, TerraformError};
pub use target::{
    DATA_DIR, DOCUMENT_FILE, TerraformOptions, TerraformTarget, data_file_name, tf_name,
};
