//! Bundle flow: curated multi-item offers with long holds and flat pricing.

use super::{Services, StorefrontError};
use crate::checkout::{CheckoutOutcome, CheckoutRequest, CheckoutSource};
use crate::aggregates::allocate_bundle_prices;
use crate::types::{
    Bundle, BundleId, BundleItem, BundleStatus, BuyerContact, ConfirmationId, DeliveryMode,
    HolderId, Money, OrderLine,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

const ACCESS_TOKEN_LEN: usize = 24;

/// Admin input for a new bundle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewBundle {
    /// Display name
    pub name: String,
    /// Description shown on the offer page
    pub description: String,
    /// Region the constituent items belong to
    pub region: String,
    /// Constituent items
    pub items: Vec<BundleItem>,
    /// Flat price for the whole bundle
    pub flat_price: Money,
    /// How the buyer reaches the offer
    pub delivery: DeliveryMode,
}

fn generate_access_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_TOKEN_LEN)
        .map(char::from)
        .collect()
}

impl Services {
    /// Create a bundle: one long hold per constituent item, then the record.
    ///
    /// If recording the bundle fails after the holds were taken, the holds
    /// are released again so nothing stays claimed for a bundle that does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::AvailabilityConflict`] when any item's
    /// advisory availability cannot cover its bundled quantity.
    pub async fn create_bundle(&self, spec: NewBundle) -> Result<Bundle, StorefrontError> {
        if spec.items.is_empty() {
            return Err(StorefrontError::Validation(
                "bundle must contain at least one item".to_string(),
            ));
        }

        let now = self.clock.now();
        let expires_at = now + self.holds.bundle_hold();
        let holder = HolderId::guest();

        // Any failure mid-way releases the holds already taken, so a bundle
        // that never comes to exist claims nothing
        let mut reservation_ids = Vec::with_capacity(spec.items.len());
        for item in &spec.items {
            let key = crate::types::ItemKey::new(&spec.region, &item.variant);
            let taken = self
                .hold_bundle_item(&holder, key, item.quantity, expires_at)
                .await;
            match taken {
                Ok(id) => reservation_ids.push(id),
                Err(e) => {
                    for id in reservation_ids {
                        self.release_quietly(id).await;
                    }
                    return Err(e);
                }
            }
        }

        let bundle = Bundle {
            id: BundleId::new(),
            name: spec.name,
            description: spec.description,
            region: spec.region,
            items: spec.items,
            flat_price: spec.flat_price,
            status: BundleStatus::Active,
            delivery: spec.delivery,
            access_token: generate_access_token(),
            purchased_by: None,
            expires_at,
            reservation_ids: reservation_ids.clone(),
            created_at: now,
        };

        if let Err(e) = self.bundles.create(bundle.clone()).await {
            for id in reservation_ids {
                self.release_quietly(id).await;
            }
            return Err(e.into());
        }

        tracing::info!(
            bundle_id = %bundle.id,
            region = %bundle.region,
            items = bundle.items.len(),
            flat_price = %bundle.flat_price,
            expires_at = %bundle.expires_at,
            "Bundle created"
        );
        Ok(bundle)
    }

    async fn hold_bundle_item(
        &self,
        holder: &HolderId,
        key: crate::types::ItemKey,
        quantity: u32,
        expires_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<crate::types::ReservationId, StorefrontError> {
        let total = self.inventory.total(&key).await?;
        let available = self.ledger.available(&key, total).await;
        if quantity > available {
            return Err(StorefrontError::AvailabilityConflict {
                item: key,
                requested: quantity,
                available,
            });
        }
        Ok(self
            .ledger
            .create_reservation(holder.clone(), key, quantity, Some(expires_at))
            .await?)
    }

    /// Delete a bundle, releasing every hold it carried
    ///
    /// # Errors
    ///
    /// Returns an error if the bundle is unknown.
    pub async fn delete_bundle(&self, id: BundleId) -> Result<(), StorefrontError> {
        let bundle = self
            .bundles
            .get(id)
            .await
            .ok_or_else(|| StorefrontError::NotFound(format!("bundle {id}")))?;
        for reservation_id in bundle.reservation_ids {
            self.release_quietly(reservation_id).await;
        }
        self.bundles.remove(id).await?;
        Ok(())
    }

    /// Fetch the bundle behind a shareable-link token, active ones only
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::NotFound`] for unknown tokens and for
    /// bundles past their hold window.
    pub async fn bundle_by_token(&self, token: &str) -> Result<Bundle, StorefrontError> {
        let bundle = self
            .bundles
            .find_by_token(token)
            .await
            .ok_or_else(|| StorefrontError::NotFound("bundle".to_string()))?;
        if bundle.status != BundleStatus::Active || bundle.expires_at <= self.clock.now() {
            return Err(StorefrontError::NotFound("bundle".to_string()));
        }
        Ok(bundle)
    }

    /// All bundles, for the admin surface
    pub async fn list_bundles(&self) -> Vec<Bundle> {
        self.bundles.list().await
    }

    /// Finalize a bundle purchase against a payment confirmation.
    ///
    /// The flat price is allocated across constituent items proportionally
    /// by retail share; each allocated line consumes the hold the bundle
    /// already carries. Assigned-account bundles ignore the caller identity
    /// and credit the assigned holder.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::NotFound`] for unknown tokens, a
    /// validation error for non-purchasable bundles, or the saga's failure
    /// taxonomy.
    pub async fn purchase_bundle(
        &self,
        token: &str,
        confirmation_id: ConfirmationId,
        purchaser: HolderId,
        contact: Option<BuyerContact>,
    ) -> Result<CheckoutOutcome, StorefrontError> {
        let bundle = self
            .bundles
            .find_by_token(token)
            .await
            .ok_or_else(|| StorefrontError::NotFound("bundle".to_string()))?;

        if bundle.status != BundleStatus::Active {
            return Err(StorefrontError::Validation(format!(
                "bundle is {:?}, not purchasable",
                bundle.status
            )));
        }
        if bundle.expires_at <= self.clock.now() {
            return Err(StorefrontError::Validation(
                "bundle hold window has lapsed".to_string(),
            ));
        }

        let holder = match &bundle.delivery {
            DeliveryMode::AssignedAccount { holder } => holder.clone(),
            DeliveryMode::ShareableLink => purchaser,
        };

        // Allocation order follows the item order, as do the stamped holds
        let lines: Vec<OrderLine> = allocate_bundle_prices(&bundle)
            .into_iter()
            .zip(bundle.reservation_ids.iter())
            .map(|(allocated, reservation_id)| OrderLine {
                item: allocated.item,
                title: allocated.title,
                unit_price: allocated.unit_price,
                quantity: allocated.quantity,
                reservation_id: *reservation_id,
            })
            .collect();
        if lines.is_empty() {
            return Err(StorefrontError::Validation(
                "bundle has no allocatable items".to_string(),
            ));
        }

        self.finalize(CheckoutRequest {
            confirmation_id,
            holder,
            contact,
            lines,
            source: CheckoutSource::Bundle {
                bundle_id: bundle.id,
            },
        })
        .await
    }

    /// Expire active bundles past their hold window, releasing their holds.
    /// Returns how many bundles were expired. Called by the periodic sweep.
    pub async fn expire_stale_bundles(&self) -> usize {
        let now = self.clock.now();
        let mut expired = 0;
        for bundle in self.bundles.list().await {
            if bundle.status == BundleStatus::Active && bundle.expires_at <= now {
                for reservation_id in &bundle.reservation_ids {
                    self.release_quietly(*reservation_id).await;
                }
                match self.bundles.expire(bundle.id).await {
                    Ok(()) => {
                        tracing::info!(bundle_id = %bundle.id, "Bundle expired by sweep");
                        expired += 1;
                    }
                    Err(e) => {
                        tracing::warn!(bundle_id = %bundle.id, error = %e, "Bundle expiry failed");
                    }
                }
            }
        }
        expired
    }
}
