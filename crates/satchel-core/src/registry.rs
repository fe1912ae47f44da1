// ----- standard library imports
use std::collections::HashMap;
use std::sync::Mutex;
// ----- extra library imports
use cashu::{CurrencyUnit, KeySetInfo, MintUrl};
// ----- local imports
use crate::client::MintInfo;
use crate::error::{Error, Result};

// ----- end imports

///////////////////////////////////////////// select_keyset
/// Keyset new outputs are derived on: among the unit's active keysets, hex
/// (version 00) ids come before legacy ids, first one wins, mint order
/// breaks ties.
pub fn select_keyset(keysets: &[KeySetInfo], unit: &CurrencyUnit) -> Result<KeySetInfo> {
    if keysets.is_empty() {
        return Err(Error::NoKeysets);
    }
    let eligible: Vec<&KeySetInfo> = keysets
        .iter()
        .filter(|k| k.unit == *unit && k.active)
        .collect();
    let hex_first = eligible
        .iter()
        .find(|k| k.id.to_string().starts_with("00"))
        .or_else(|| eligible.first());
    hex_first
        .map(|k| (*k).clone())
        .ok_or(Error::NoActiveKeysetsForUnit(unit.clone()))
}

///////////////////////////////////////////// MintState
#[derive(Debug, Clone, Default)]
pub struct MintState {
    pub keysets: Vec<KeySetInfo>,
    pub info: MintInfo,
}

///////////////////////////////////////////// MintRegistry
/// Which mints the wallet knows, which one is active, and what each mint
/// last reported about its keysets and capabilities. Mint insertion order is
/// preserved; it breaks ties in keyset selection and fixes MPP fan-out order.
pub struct MintRegistry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    active: MintUrl,
    unit: CurrencyUnit,
    mints: HashMap<MintUrl, MintState>,
    order: Vec<MintUrl>,
}

impl MintRegistry {
    pub fn new(active: MintUrl, unit: CurrencyUnit) -> Self {
        let inner = RegistryInner {
            mints: HashMap::from([(active.clone(), MintState::default())]),
            order: vec![active.clone()],
            active,
            unit,
        };
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn active_mint(&self) -> MintUrl {
        self.inner.lock().unwrap().active.clone()
    }

    pub fn active_unit(&self) -> CurrencyUnit {
        self.inner.lock().unwrap().unit.clone()
    }

    /// Makes `mint` the active one, registering it if unseen. An explicit
    /// unit switches the active unit as well.
    pub fn activate_mint(&self, mint: MintUrl, unit: Option<CurrencyUnit>) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.mints.contains_key(&mint) {
            inner.mints.insert(mint.clone(), MintState::default());
            inner.order.push(mint.clone());
        }
        tracing::info!("active mint is now {mint}");
        inner.active = mint;
        if let Some(unit) = unit {
            inner.unit = unit;
        }
    }

    /// Refreshes the cached keysets/info a connector fetched for `mint`.
    pub fn update_mint(&self, mint: MintUrl, keysets: Vec<KeySetInfo>, info: MintInfo) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.mints.contains_key(&mint) {
            inner.order.push(mint.clone());
        }
        inner.mints.insert(mint, MintState { keysets, info });
    }

    pub fn known_mints(&self) -> Vec<MintUrl> {
        self.inner.lock().unwrap().order.clone()
    }

    pub fn keysets(&self, mint: &MintUrl) -> Vec<KeySetInfo> {
        let inner = self.inner.lock().unwrap();
        inner
            .mints
            .get(mint)
            .map(|s| s.keysets.clone())
            .unwrap_or_default()
    }

    pub fn info(&self, mint: &MintUrl) -> MintInfo {
        let inner = self.inner.lock().unwrap();
        inner
            .mints
            .get(mint)
            .map(|s| s.info.clone())
            .unwrap_or_default()
    }

    pub fn active_keysets(&self) -> Vec<KeySetInfo> {
        self.keysets(&self.active_mint())
    }

    /// Keyset the wallet derives new outputs on for the active mint.
    pub fn active_keyset(&self) -> Result<KeySetInfo> {
        select_keyset(&self.active_keysets(), &self.active_unit())
    }

    /// Mints advertising NUT-15 multi-path support for (method, unit), in
    /// registry order.
    pub fn multi_mints(&self, method: &str, unit: &CurrencyUnit) -> Vec<MintUrl> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter(|url| {
                inner
                    .mints
                    .get(url)
                    .map(|s| s.info.supports_mpp(method, unit))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}
