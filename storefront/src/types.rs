//! Domain types for the adspace marketplace storefront.
//!
//! This module contains all value objects and entities shared by the
//! reservation ledger, cart, checkout finalizer, and bundle holds: item keys,
//! money, reservations, cart lines, orders with per-unit fulfillment slots,
//! and admin-curated bundles.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a reservation (hold)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random `OrderId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `OrderId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a custom bundle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleId(Uuid);

impl BundleId {
    /// Creates a new random `BundleId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BundleId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment confirmation identifier, issued by the payment provider.
///
/// Doubles as the checkout idempotency key: exactly one order may exist per
/// confirmation id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmationId(String);

impl ConfirmationId {
    /// Wraps a provider-issued confirmation id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of the party holding a reservation or cart.
///
/// Supplied by the auth layer per request; unauthenticated bundle purchases
/// use the `guest` sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HolderId(String);

impl HolderId {
    /// Sentinel holder for unauthenticated purchases
    pub const GUEST: &'static str = "guest";

    /// Wraps an auth-supplied holder id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The sentinel holder for unauthenticated flows
    #[must_use]
    pub fn guest() -> Self {
        Self(Self::GUEST.to_string())
    }

    /// True when this is the guest sentinel
    #[must_use]
    pub fn is_guest(&self) -> bool {
        self.0 == Self::GUEST
    }

    /// Returns the id as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Item Key
// ============================================================================

/// Error returned when parsing an item key from its string form
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid item key {input:?}: expected \"region#variant\"")]
pub struct ItemKeyParseError {
    /// The rejected input
    pub input: String,
}

/// Composite identifier `{region}#{variant}` uniquely naming a sellable
/// unit type (e.g. `CA#quarter`).
///
/// This key is the join point between the inventory store, reservation
/// ledger, cart, and order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Region code (e.g. a state code)
    pub region: String,
    /// Ad-type variant tag (e.g. "quarter", "half", "full")
    pub variant: String,
}

impl ItemKey {
    /// Creates an item key from its parts
    #[must_use]
    pub fn new(region: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.region, self.variant)
    }
}

impl FromStr for ItemKey {
    type Err = ItemKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('#') {
            Some((region, variant)) if !region.is_empty() && !variant.is_empty() => {
                Ok(Self::new(region, variant))
            }
            _ => Err(ItemKeyParseError {
                input: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Money Value Object (decimal currency, precision preserved to the cent)
// ============================================================================

/// Represents money as a decimal amount in its natural form (e.g. `44.99`),
/// never floats and never integer cents.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Money(Decimal);

impl Money {
    /// The zero amount
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wraps a decimal amount
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates a `Money` value from whole currency units (e.g. dollars)
    #[must_use]
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// Returns the inner decimal amount
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiplies by a unit quantity
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Rounds to cent precision, midpoints away from zero
    #[must_use]
    pub fn round_cents(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0.round_dp(2))
    }
}

// ============================================================================
// Reservation (hold)
// ============================================================================

/// Reservation lifecycle status
///
/// `Released` and `Completed` are terminal; a reservation never transitions
/// out of either.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Live hold counted against availability
    Active,
    /// Expired unconsumed or explicitly cancelled
    Released,
    /// Payment succeeded and inventory durably decremented
    Completed,
}

impl ReservationStatus {
    /// True for `Released` and `Completed`
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Completed)
    }
}

/// A time-bounded claim of `quantity` units against an item's inventory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier
    pub id: ReservationId,
    /// Party holding the claim
    pub holder: HolderId,
    /// Item being claimed
    pub item: ItemKey,
    /// Units held (positive)
    pub quantity: u32,
    /// Current lifecycle status
    pub status: ReservationStatus,
    /// When the hold was created
    pub created_at: DateTime<Utc>,
    /// Absolute time after which the hold no longer counts against availability
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates a new active reservation
    #[must_use]
    pub const fn new(
        id: ReservationId,
        holder: HolderId,
        item: ItemKey,
        quantity: u32,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            holder,
            item,
            quantity,
            status: ReservationStatus::Active,
            created_at,
            expires_at,
        }
    }

    /// True when the hold has passed its expiry
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// True when the hold still counts against availability
    #[must_use]
    pub fn counts_against_availability(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && !self.is_expired(now)
    }
}

// ============================================================================
// Cart
// ============================================================================

/// One line of a cart: a claimed item bound to a reservation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Item being purchased
    pub item: ItemKey,
    /// Display title captured at add time
    pub title: String,
    /// Unit price (decimal currency)
    pub unit_price: Money,
    /// Units in this line
    pub quantity: u32,
    /// When the line was first added
    pub added_at: DateTime<Utc>,
    /// Back-reference to the hold backing this line; the cart does not own
    /// the reservation lifecycle
    pub reservation_id: ReservationId,
}

impl CartLine {
    /// Price of the whole line
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// A holder's cart: an ordered list of claimed lines, at most one per item key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Owning holder
    pub holder: HolderId,
    /// Claimed lines, in add order
    pub lines: Vec<CartLine>,
    /// When the cart was lazily created
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a holder
    #[must_use]
    pub const fn new(holder: HolderId, created_at: DateTime<Utc>) -> Self {
        Self {
            holder,
            lines: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Finds the line for an item key, if present
    #[must_use]
    pub fn line_for(&self, item: &ItemKey) -> Option<&CartLine> {
        self.lines.iter().find(|line| &line.item == item)
    }
}

/// Totals over a set of cart lines
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    /// Sum of unit price times quantity over all lines
    pub subtotal: Money,
    /// Equal to the subtotal; this domain applies no tax
    pub total: Money,
    /// Sum of quantities over all lines
    pub item_count: u32,
}

// ============================================================================
// Order and fulfillment slots
// ============================================================================

/// Buyer contact information captured at checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerContact {
    /// Contact email
    pub email: String,
    /// Buyer name
    pub name: String,
    /// Optional phone number
    pub phone: Option<String>,
}

/// Fulfillment slot status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    /// Awaiting a creative submission
    Pending,
    /// Creative submitted
    Completed,
}

/// One purchased unit's creative-submission tracker.
///
/// A line of quantity N gets N independent slots; each purchased ad unit
/// requires its own uploaded creative, tracked and editable separately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentSlot {
    /// Slot number within the line (1..=quantity)
    pub slot_number: u32,
    /// Object-storage reference to the submitted creative, if any
    pub submission_url: Option<String>,
    /// Current slot status
    pub status: SlotStatus,
    /// When the first submission arrived
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the submission was last edited
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl FulfillmentSlot {
    /// Creates an empty pending slot
    #[must_use]
    pub const fn pending(slot_number: u32) -> Self {
        Self {
            slot_number,
            submission_url: None,
            status: SlotStatus::Pending,
            submitted_at: None,
            last_edited_at: None,
        }
    }

    /// Records a creative submission. The first one completes the slot;
    /// later ones replace the url and stamp the edit time, keeping the
    /// original submission time.
    pub fn submit(&mut self, submission_url: String, now: DateTime<Utc>) {
        self.submission_url = Some(submission_url);
        if self.status == SlotStatus::Pending {
            self.status = SlotStatus::Completed;
            self.submitted_at = Some(now);
        } else {
            self.last_edited_at = Some(now);
        }
    }
}

/// One line of an order: a frozen snapshot of what was purchased
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Item purchased
    pub item: ItemKey,
    /// Display title as of purchase
    pub title: String,
    /// Unit price as of purchase
    pub unit_price: Money,
    /// Units purchased
    pub quantity: u32,
    /// The hold this line consumed
    pub reservation_id: ReservationId,
}

impl OrderLine {
    /// Price of the whole line
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Initializes fulfillment slots for a set of order lines: N pending slots
/// per line of quantity N, keyed by item.
#[must_use]
pub fn initialize_slot_submissions(lines: &[OrderLine]) -> HashMap<ItemKey, Vec<FulfillmentSlot>> {
    lines
        .iter()
        .map(|line| {
            let slots = (1..=line.quantity).map(FulfillmentSlot::pending).collect();
            (line.item.clone(), slots)
        })
        .collect()
}

/// A completed purchase, created exactly once per payment confirmation.
///
/// The line snapshot is immutable after creation; only the fulfillment slot
/// sub-structure mutates as creative submissions arrive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier
    pub id: OrderId,
    /// Payment confirmation this order settles (idempotency key)
    pub confirmation_id: ConfirmationId,
    /// Purchasing holder
    pub holder: HolderId,
    /// Buyer contact captured at checkout
    pub contact: BuyerContact,
    /// Frozen line snapshot
    pub lines: Vec<OrderLine>,
    /// Sum of line totals
    pub subtotal: Money,
    /// Equal to the subtotal; this domain applies no tax
    pub total: Money,
    /// When the order was created
    pub created_at: DateTime<Utc>,
    /// Per-item fulfillment slot tracking
    pub fulfillment: HashMap<ItemKey, Vec<FulfillmentSlot>>,
}

impl Order {
    /// Builds an order from a line snapshot, initializing all slots pending
    #[must_use]
    pub fn new(
        id: OrderId,
        confirmation_id: ConfirmationId,
        holder: HolderId,
        contact: BuyerContact,
        lines: Vec<OrderLine>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let subtotal: Money = lines.iter().map(OrderLine::line_total).sum();
        let fulfillment = initialize_slot_submissions(&lines);
        Self {
            id,
            confirmation_id,
            holder,
            contact,
            lines,
            subtotal,
            total: subtotal,
            created_at,
            fulfillment,
        }
    }
}

// ============================================================================
// Custom Bundle
// ============================================================================

/// Bundle lifecycle status; `Purchased` and `Expired` are terminal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleStatus {
    /// Offered, holds live
    Active,
    /// Bought exactly once via its payment confirmation
    Purchased,
    /// Hold window lapsed without payment
    Expired,
}

impl BundleStatus {
    /// True for `Purchased` and `Expired`
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Purchased | Self::Expired)
    }
}

/// How a bundle reaches its buyer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMode {
    /// Sold via an opaque shareable link
    ShareableLink,
    /// Assigned to a specific account
    AssignedAccount {
        /// The account the bundle is assigned to
        holder: HolderId,
    },
}

/// One constituent item of a bundle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleItem {
    /// Ad-type variant within the bundle's region
    pub variant: String,
    /// Display title
    pub title: String,
    /// Units included
    pub quantity: u32,
    /// Retail unit price
    pub unit_price: Money,
}

impl BundleItem {
    /// Retail value of this item (unit price times quantity)
    #[must_use]
    pub fn retail(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// An admin-curated multi-item offer sold as a single flat-priced unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    /// Unique bundle identifier
    pub id: BundleId,
    /// Human name
    pub name: String,
    /// Human description
    pub description: String,
    /// Region all constituent items belong to
    pub region: String,
    /// Constituent items
    pub items: Vec<BundleItem>,
    /// Admin-set flat total price
    pub flat_price: Money,
    /// Current lifecycle status
    pub status: BundleStatus,
    /// How the bundle reaches its buyer
    pub delivery: DeliveryMode,
    /// Opaque access token for the shareable link
    pub access_token: String,
    /// Identity of the purchaser, recorded at purchase time
    pub purchased_by: Option<HolderId>,
    /// When the bundle's holds lapse
    pub expires_at: DateTime<Utc>,
    /// Holds backing the constituent items, one per item
    pub reservation_ids: Vec<ReservationId>,
    /// When the bundle was created
    pub created_at: DateTime<Utc>,
}

impl Bundle {
    /// Retail value, always recomputed from the current items so it can
    /// never drift after an item-list edit
    #[must_use]
    pub fn retail_value(&self) -> Money {
        self.items.iter().map(BundleItem::retail).sum()
    }

    /// Item key for a constituent item (bundle region + item variant)
    #[must_use]
    pub fn item_key(&self, item: &BundleItem) -> ItemKey {
        ItemKey::new(self.region.clone(), item.variant.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn item_key_display_and_parse_round_trip() {
        let key = ItemKey::new("CA", "quarter");
        assert_eq!(key.to_string(), "CA#quarter");
        assert_eq!("CA#quarter".parse::<ItemKey>().unwrap(), key);
    }

    #[test]
    fn item_key_parse_rejects_missing_separator() {
        assert!("CAquarter".parse::<ItemKey>().is_err());
        assert!("#quarter".parse::<ItemKey>().is_err());
        assert!("CA#".parse::<ItemKey>().is_err());
    }

    #[test]
    fn money_preserves_cent_precision() {
        let price = Money::new(dec("44.99"));
        assert_eq!(price.times(3).amount(), dec("134.97"));
    }

    #[test]
    fn money_rounds_midpoint_away_from_zero() {
        let amount = Money::new(dec("0.125"));
        assert_eq!(amount.round_cents().amount(), dec("0.13"));
    }

    #[test]
    fn reservation_counts_against_availability_only_when_active_and_unexpired() {
        let now = Utc::now();
        let mut reservation = Reservation::new(
            ReservationId::new(),
            HolderId::guest(),
            ItemKey::new("MT", "half"),
            1,
            now,
            now + chrono::Duration::minutes(15),
        );
        assert!(reservation.counts_against_availability(now));

        assert!(!reservation.counts_against_availability(now + chrono::Duration::minutes(15)));

        reservation.status = ReservationStatus::Released;
        assert!(!reservation.counts_against_availability(now));
    }

    #[test]
    fn order_initializes_one_pending_slot_per_unit() {
        let lines = vec![OrderLine {
            item: ItemKey::new("MT", "half"),
            title: "Half page".to_string(),
            unit_price: Money::from_major(250),
            quantity: 3,
            reservation_id: ReservationId::new(),
        }];
        let order = Order::new(
            OrderId::new(),
            ConfirmationId::new("pi_123"),
            HolderId::new("holder-1"),
            BuyerContact {
                email: "buyer@example.com".to_string(),
                name: "Buyer".to_string(),
                phone: None,
            },
            lines,
            Utc::now(),
        );

        let slots = order.fulfillment.get(&ItemKey::new("MT", "half")).unwrap();
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|s| s.status == SlotStatus::Pending));
        assert_eq!(
            slots.iter().map(|s| s.slot_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(order.subtotal, Money::from_major(750));
        assert_eq!(order.total, order.subtotal);
    }

    #[test]
    fn bundle_retail_value_recomputes_after_item_edit() {
        let mut bundle = Bundle {
            id: BundleId::new(),
            name: "Western pack".to_string(),
            description: String::new(),
            region: "MT".to_string(),
            items: vec![
                BundleItem {
                    variant: "full".to_string(),
                    title: "Full page".to_string(),
                    quantity: 1,
                    unit_price: Money::from_major(700),
                },
                BundleItem {
                    variant: "quarter".to_string(),
                    title: "Quarter page".to_string(),
                    quantity: 2,
                    unit_price: Money::from_major(150),
                },
            ],
            flat_price: Money::from_major(500),
            status: BundleStatus::Active,
            delivery: DeliveryMode::ShareableLink,
            access_token: "token".to_string(),
            purchased_by: None,
            expires_at: Utc::now() + chrono::Duration::hours(24),
            reservation_ids: Vec::new(),
            created_at: Utc::now(),
        };
        assert_eq!(bundle.retail_value(), Money::from_major(1000));

        bundle.items.pop();
        assert_eq!(bundle.retail_value(), Money::from_major(700));
    }
}
