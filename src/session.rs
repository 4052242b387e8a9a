use uuid::Uuid;

use crate::{error::SessionError, models::Offer};

/// Offers generated so far in a session, plus the wishlisted subset.
#[derive(Debug, Default, Clone)]
pub struct OfferCollection {
    offers: Vec<Offer>,
    // insertion order of wishlisting
    wishlist: Vec<Uuid>,
}

impl OfferCollection {
    /// Appends a round's offers after the existing ones.
    pub fn append(&mut self, round: Vec<Offer>) {
        self.offers.extend(round);
    }

    pub fn offers(&self) -> &[Offer] { &self.offers }

    pub fn len(&self) -> usize { self.offers.len() }

    pub fn is_empty(&self) -> bool { self.offers.is_empty() }

    pub fn has_generated_once(&self) -> bool { !self.is_empty() }

    pub fn get(&self, id: Uuid) -> Option<&Offer> {
        self.offers.iter().find(|o| o.id == id)
    }

    /// Flips wishlist membership and returns the new state.
    pub fn toggle_wishlist(&mut self, id: Uuid) -> Result<bool, SessionError> {
        if self.get(id).is_none() {
            return Err(SessionError::UnknownOffer(id));
        }
        if let Some(pos) = self.wishlist.iter().position(|w| *w == id) {
            self.wishlist.remove(pos);
            Ok(false)
        } else {
            self.wishlist.push(id);
            Ok(true)
        }
    }

    pub fn is_wishlisted(&self, id: Uuid) -> bool {
        self.wishlist.contains(&id)
    }

    pub fn wishlist_ids(&self) -> &[Uuid] { &self.wishlist }

    /// Wishlisted offers in collection order.
    pub fn wishlisted_offers(&self) -> Vec<&Offer> {
        self.offers.iter().filter(|o| self.is_wishlisted(o.id)).collect()
    }
}

#[derive(Debug, Default)]
pub struct Session {
    pub collection: OfferCollection,
    pub generating: bool,
}
