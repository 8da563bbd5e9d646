use super::VendorLookup;
use log::warn;
use mac_oui::Oui;
use once_cell::sync::Lazy;

/// The embedded OUI database, loaded on first use.
static OUI_DB: Lazy<Option<Oui>> = Lazy::new(|| match Oui::default() {
    Ok(db) => Some(db),
    Err(e) => {
        warn!("Could not load the OUI database, vendors will be empty: {e:?}");
        None
    }
});

/// Vendor lookup against the IEEE OUI registry shipped with `mac_oui`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OuiVendors;

impl VendorLookup for OuiVendors {
    fn vendor(&self, mac_address: &str) -> Option<String> {
        match OUI_DB.as_ref()?.lookup_by_mac(mac_address) {
            Ok(Some(entry)) => Some(entry.company_name.clone()),
            _ => None,
        }
    }
}
