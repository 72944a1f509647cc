// ── Tenant identity ──
//
// A tenant is the isolation scope for one cloud product. The default
// tenant is the account-level session with no product attached.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque product identifier assigned by the device cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(u32);

impl ProductId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProductId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Partition key for workers, tokens, caches and subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "productId")]
pub enum Tenant {
    #[default]
    Default,
    Product(ProductId),
}

impl Tenant {
    pub fn product_id(self) -> Option<ProductId> {
        match self {
            Self::Default => None,
            Self::Product(id) => Some(id),
        }
    }

    pub fn is_default(self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Product(id) => write!(f, "product:{id}"),
        }
    }
}

impl From<ProductId> for Tenant {
    fn from(id: ProductId) -> Self {
        Self::Product(id)
    }
}

impl From<Option<ProductId>> for Tenant {
    fn from(id: Option<ProductId>) -> Self {
        id.map_or(Self::Default, Self::Product)
    }
}

impl From<Option<u32>> for Tenant {
    fn from(id: Option<u32>) -> Self {
        id.map(ProductId::new).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_product_is_default_tenant() {
        assert_eq!(Tenant::from(None::<u32>), Tenant::Default);
        assert_eq!(
            Tenant::from(Some(4242_u32)),
            Tenant::Product(ProductId::new(4242))
        );
    }

    #[test]
    fn display_names_tenant_scope() {
        assert_eq!(Tenant::Default.to_string(), "default");
        assert_eq!(Tenant::from(ProductId::new(7)).to_string(), "product:7");
    }
}
