//! Merge strategies for entity records
//!
//! Every phase result is turned into a [`Patch`] and applied to the current
//! record. Patches are fill-forward: a value that is already set is never
//! replaced by an absent one, and list fields only ever grow.

use crate::state::entity::{
    Address, EntityRecord, PostRecord, ReviewRecord, ReviewsRecord, ServiceRecord,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Sets `target` only if it is still empty
pub fn fill<T>(target: &mut Option<T>, value: Option<T>) {
    if target.is_none() {
        *target = value;
    }
}

/// Replaces `target` with `value` unless `value` is absent
pub fn overwrite_present<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// Removes duplicates and blank entries, keeping first occurrences in order
pub fn unique_non_empty<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();

    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

/// Appends `values` to `target`, skipping duplicates and blanks
pub fn extend_unique(target: &mut Vec<String>, values: Vec<String>) {
    let existing = std::mem::take(target);
    *target = unique_non_empty(existing.into_iter().chain(values));
}

/// Puts `new` in front of `existing`, dropping new items whose key is already known
pub fn prepend_unique<T, K>(existing: Vec<T>, new: Vec<T>, key: K) -> Vec<T>
where
    K: Fn(&T) -> Option<String>,
{
    let mut seen: HashSet<String> = existing.iter().filter_map(&key).collect();
    let mut merged: Vec<T> = new
        .into_iter()
        .filter(|item| key(item).map_or(true, |k| seen.insert(k)))
        .collect();

    merged.extend(existing);
    merged
}

/// Appends `new` after `existing`, dropping new items whose key is already known
pub fn append_unique<T, K>(mut existing: Vec<T>, new: Vec<T>, key: K) -> Vec<T>
where
    K: Fn(&T) -> Option<String>,
{
    let mut seen: HashSet<String> = existing.iter().filter_map(&key).collect();

    existing.extend(
        new.into_iter()
            .filter(|item| key(item).map_or(true, |k| seen.insert(k))),
    );
    existing
}

/// Bookkeeping for a freshly seeded entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedPatch {
    pub url: String,
    pub source_url: String,
    pub referrer: String,
    pub started_at: DateTime<Utc>,
}

/// Identity fields read from the home view
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityPatch {
    pub title: Option<String>,
    pub verified: Option<bool>,
    pub messenger: Option<String>,
    pub likes: Option<u64>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// Values found by the labeled-field probes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldsPatch {
    pub categories: Vec<String>,
    pub price_range: Option<String>,
    pub info: Vec<String>,
    pub checkins: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub transit: Option<String>,
    pub instagram: Option<String>,
    pub twitter: Option<String>,
    pub payment: Option<String>,
    pub youtube: Option<String>,
    pub impressum: Vec<String>,
    pub awards: Vec<String>,
    pub mission: Vec<String>,
    pub overview: Vec<String>,
    pub products: Vec<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// One phase result, ready to be merged into an entity
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Seed(SeedPatch),
    Home(IdentityPatch, FieldsPatch),
    About(FieldsPatch),
    Services(Vec<ServiceRecord>),
    Reviews(ReviewsRecord),
    Post(PostRecord),
}

impl Patch {
    /// Applies this patch, returning the new record
    pub fn apply(self, mut record: EntityRecord) -> EntityRecord {
        match self {
            Self::Seed(seed) => {
                fill(&mut record.url, Some(seed.url));
                fill(&mut record.source_url, Some(seed.source_url));
                fill(&mut record.referrer, Some(seed.referrer));
                fill(&mut record.started_at, Some(seed.started_at));
            }
            Self::Home(identity, fields) => {
                apply_identity(&mut record, identity);
                apply_fields(&mut record, fields);
            }
            Self::About(fields) => apply_fields(&mut record, fields),
            Self::Services(services) => {
                record.services = append_unique(record.services, services, |s| Some(s.key()));
            }
            Self::Reviews(reviews) => {
                fill(&mut record.reviews.average, reviews.average);
                fill(&mut record.reviews.count, reviews.count);
                record.reviews.reviews = prepend_unique(
                    std::mem::take(&mut record.reviews.reviews),
                    reviews.reviews,
                    ReviewRecord::key,
                );
            }
            Self::Post(post) => {
                record.posts = prepend_unique(record.posts, vec![post], PostRecord::key);
            }
        }

        record
    }
}

fn apply_identity(record: &mut EntityRecord, identity: IdentityPatch) {
    overwrite_present(&mut record.title, identity.title.filter(|t| !t.is_empty()));
    overwrite_present(&mut record.verified, identity.verified);
    overwrite_present(
        &mut record.messenger,
        identity.messenger.filter(|m| !m.is_empty()),
    );
    overwrite_present(&mut record.likes, identity.likes);

    let address = record.address.get_or_insert_with(Address::default);
    overwrite_present(&mut address.street, identity.street);
    overwrite_present(&mut address.postal_code, identity.postal_code);
    overwrite_present(&mut address.region, identity.region);
    overwrite_present(&mut address.city, identity.city);
}

fn apply_fields(record: &mut EntityRecord, fields: FieldsPatch) {
    extend_unique(&mut record.categories, fields.categories);
    extend_unique(&mut record.info, fields.info);

    fill(&mut record.price_range, fields.price_range);
    fill(&mut record.checkins, fields.checkins);
    fill(&mut record.website, fields.website);
    fill(&mut record.email, fields.email);
    fill(&mut record.phone, fields.phone);
    fill(&mut record.transit, fields.transit);
    fill(&mut record.instagram, fields.instagram);
    fill(&mut record.twitter, fields.twitter);
    fill(&mut record.payment, fields.payment);
    fill(&mut record.youtube, fields.youtube);

    extend_unique(&mut record.impressum, fields.impressum);
    extend_unique(&mut record.awards, fields.awards);
    extend_unique(&mut record.mission, fields.mission);
    extend_unique(&mut record.overview, fields.overview);
    extend_unique(&mut record.products, fields.products);

    let address = record.address.get_or_insert_with(Address::default);
    overwrite_present(&mut address.lat, fields.lat);
    overwrite_present(&mut address.lng, fields.lng);
}
