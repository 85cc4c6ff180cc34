//! The authorized-IMEI catalog lives outside this core (spec §1's "external
//! device catalog"); this trait is the narrow contract the router calls
//! through. `AllowAllCatalog` is the default until a real implementation is
//! wired in, matching spec §9's "model external collaborators as explicit
//! service objects, not singletons" note.

pub trait DeviceCatalog: Send + Sync {
    fn is_authorized(&self, identifier: &str) -> bool;
}

pub struct AllowAllCatalog;

impl DeviceCatalog for AllowAllCatalog {
    fn is_authorized(&self, _identifier: &str) -> bool {
        true
    }
}
