//! Status enums for various entities.
//!
//! Stored documents carry statuses as free text written by several
//! generations of forms ("In transit", "in_transit", "IN-TRANSIT"). Parsing
//! is therefore lenient about case and separators, while serialization always
//! produces the canonical label.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Normalize a free-text status for matching: lowercase, `_`/`-` to spaces,
/// runs of whitespace collapsed.
fn normalize_label(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shipping status of a vehicle.
///
/// Progression is `Pending → Loading → Shipped → In transit → Delivered`.
/// The order is advisory: the store does not enforce it and regressions are
/// recorded, only flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShippingStatus {
    Pending,
    Loading,
    Shipped,
    InTransit,
    Delivered,
}

impl ShippingStatus {
    /// All statuses in progression order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Loading,
        Self::Shipped,
        Self::InTransit,
        Self::Delivered,
    ];

    /// Canonical label as stored in `shipping.status` and shipping records.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Loading => "Loading",
            Self::Shipped => "Shipped",
            Self::InTransit => "In transit",
            Self::Delivered => "Delivered",
        }
    }

    /// Title of the timeline entry this status produces, if any.
    ///
    /// Only `Shipped`, `In transit` and `Delivered` write timeline entries.
    #[must_use]
    pub const fn timeline_title(self) -> Option<&'static str> {
        match self {
            Self::Shipped => Some("Vehicle Shipped"),
            Self::InTransit => Some("Vehicle In Transit"),
            Self::Delivered => Some("Vehicle Delivered"),
            Self::Pending | Self::Loading => None,
        }
    }

    /// Default description for the timeline entry.
    #[must_use]
    pub const fn timeline_description(self) -> &'static str {
        match self {
            Self::Pending => "Shipment is being arranged",
            Self::Loading => "Vehicle is being loaded for export",
            Self::Shipped => "Vehicle has left the port of origin",
            Self::InTransit => "Vehicle is in transit to the destination port",
            Self::Delivered => "Vehicle has been delivered",
        }
    }

    /// Whether moving from `self` to `next` goes backwards.
    #[must_use]
    pub fn is_regression_to(self, next: Self) -> bool {
        next < self
    }

    /// Lenient parse; returns `None` for unrecognized labels.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match normalize_label(s).as_str() {
            "pending" => Some(Self::Pending),
            "loading" => Some(Self::Loading),
            "shipped" => Some(Self::Shipped),
            "in transit" | "intransit" => Some(Self::InTransit),
            "delivered" => Some(Self::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShippingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ShippingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| format!("invalid shipping status: {s}"))
    }
}

impl Serialize for ShippingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ShippingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Customer account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Pending,
    Blocked,
}

impl CustomerStatus {
    /// Lenient parse covering the labels older signup flows wrote.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match normalize_label(s).as_str() {
            "active" | "enabled" | "verified" => Some(Self::Active),
            "inactive" | "disabled" => Some(Self::Inactive),
            "pending" | "unverified" => Some(Self::Pending),
            "blocked" | "suspended" | "banned" => Some(Self::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for CustomerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Pending => write!(f, "pending"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Admin role with different permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    /// Full access including admin user management.
    SuperAdmin,
    /// Full access to store management features.
    Admin,
    /// Sales and shipping management.
    Manager,
    /// Day-to-day operations staff.
    Staff,
}

impl std::fmt::Display for AdminRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuperAdmin => write!(f, "super_admin"),
            Self::Admin => write!(f, "admin"),
            Self::Manager => write!(f, "manager"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

impl std::str::FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "super admin" | "superadmin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "staff" => Ok(Self::Staff),
            _ => Err(format!("invalid admin role: {s}")),
        }
    }
}

/// Kind of principal a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Admin,
    Customer,
}

impl std::fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Customer => write!(f, "customer"),
        }
    }
}

impl std::str::FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "admin" => Ok(Self::Admin),
            "customer" => Ok(Self::Customer),
            _ => Err(format!("invalid principal kind: {s}")),
        }
    }
}

/// Role carried by a verified principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "role", rename_all = "snake_case")]
pub enum Role {
    Admin(AdminRole),
    Customer,
}

impl Role {
    /// The principal kind this role belongs to.
    #[must_use]
    pub const fn kind(self) -> PrincipalKind {
        match self {
            Self::Admin(_) => PrincipalKind::Admin,
            Self::Customer => PrincipalKind::Customer,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shipping_status_lenient_parse() {
        assert_eq!(
            ShippingStatus::parse_lenient("In transit"),
            Some(ShippingStatus::InTransit)
        );
        assert_eq!(
            ShippingStatus::parse_lenient("in_transit"),
            Some(ShippingStatus::InTransit)
        );
        assert_eq!(
            ShippingStatus::parse_lenient("  IN-TRANSIT "),
            Some(ShippingStatus::InTransit)
        );
        assert_eq!(
            ShippingStatus::parse_lenient("SHIPPED"),
            Some(ShippingStatus::Shipped)
        );
        assert_eq!(ShippingStatus::parse_lenient("lost at sea"), None);
    }

    #[test]
    fn test_shipping_status_order() {
        assert!(ShippingStatus::Pending < ShippingStatus::Loading);
        assert!(ShippingStatus::InTransit < ShippingStatus::Delivered);
        assert!(ShippingStatus::Delivered.is_regression_to(ShippingStatus::Shipped));
        assert!(!ShippingStatus::Shipped.is_regression_to(ShippingStatus::Shipped));
    }

    #[test]
    fn test_only_late_statuses_have_timeline_titles() {
        assert_eq!(ShippingStatus::Pending.timeline_title(), None);
        assert_eq!(ShippingStatus::Loading.timeline_title(), None);
        assert_eq!(
            ShippingStatus::Shipped.timeline_title(),
            Some("Vehicle Shipped")
        );
        assert_eq!(
            ShippingStatus::Delivered.timeline_title(),
            Some("Vehicle Delivered")
        );
    }

    #[test]
    fn test_shipping_status_serde_uses_label() {
        let json = serde_json::to_string(&ShippingStatus::InTransit).unwrap();
        assert_eq!(json, "\"In transit\"");
        let parsed: ShippingStatus = serde_json::from_str("\"in_transit\"").unwrap();
        assert_eq!(parsed, ShippingStatus::InTransit);
        assert!(serde_json::from_str::<ShippingStatus>("\"Unknown\"").is_err());
    }

    #[test]
    fn test_customer_status_lenient_parse() {
        assert_eq!(
            CustomerStatus::parse_lenient("Active"),
            Some(CustomerStatus::Active)
        );
        assert_eq!(
            CustomerStatus::parse_lenient("suspended"),
            Some(CustomerStatus::Blocked)
        );
        assert_eq!(CustomerStatus::parse_lenient("Unknown"), None);
    }

    #[test]
    fn test_admin_role_parse() {
        assert_eq!(
            "superadmin".parse::<AdminRole>().unwrap(),
            AdminRole::SuperAdmin
        );
        assert_eq!(
            "super_admin".parse::<AdminRole>().unwrap(),
            AdminRole::SuperAdmin
        );
        assert_eq!("Manager".parse::<AdminRole>().unwrap(), AdminRole::Manager);
        assert!("customer".parse::<AdminRole>().is_err());
    }

    #[test]
    fn test_role_kind() {
        assert_eq!(Role::Admin(AdminRole::Staff).kind(), PrincipalKind::Admin);
        assert_eq!(Role::Customer.kind(), PrincipalKind::Customer);
    }
}
