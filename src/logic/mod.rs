mod padding;
mod pem_bundle;
mod soft_key;

pub use padding::{emsa_pkcs1_v15, pkcs1v15_scheme, strip_pkcs1_v15_type2, PaddingError};
pub use pem_bundle::{split_pem_bundle, PemBlock, PemBundleError};
pub use soft_key::{SoftKey, SoftKeyError};
