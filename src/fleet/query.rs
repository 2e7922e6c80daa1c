use crate::fleet::types::{QueryParams, TruckPage, TruckRecord};
use icu_collator::options::{CollatorOptions, Strength};
use icu_collator::{Collator, CollatorBorrowed};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec<'a> {
    pub field: &'a str,
    pub order: SortOrder,
}

impl<'a> SortSpec<'a> {
    /// `"field:asc"` sorts ascending; any other order token sorts descending.
    pub fn parse(raw: &'a str) -> Self {
        let (field, order) = raw.split_once(':').unwrap_or((raw, ""));
        let order = if order == "asc" {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        };
        Self { field, order }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SortValue<'a> {
    Text(&'a str),
    Number(f64),
    Opaque,
}

fn sort_value<'a>(truck: &'a TruckRecord, field: &str) -> SortValue<'a> {
    match field {
        "id" => SortValue::Text(&truck.id),
        "driver" => SortValue::Text(&truck.driver),
        "plateNumber" => SortValue::Text(&truck.plate_number),
        "status" => SortValue::Text(truck.status.as_str()),
        "lastSeen" => SortValue::Text(&truck.last_seen),
        "photoUrl" => truck
            .photo_url
            .as_deref()
            .map_or(SortValue::Opaque, SortValue::Text),
        "capacity" => SortValue::Number(truck.capacity),
        "currentLoad" => SortValue::Number(truck.current_load),
        "fuelLevel" => truck
            .fuel_level
            .map_or(SortValue::Opaque, SortValue::Number),
        _ => SortValue::Opaque,
    }
}

fn root_collator() -> Option<CollatorBorrowed<'static>> {
    let mut options = CollatorOptions::default();
    options.strength = Some(Strength::Tertiary);
    match Collator::try_new(Default::default(), options) {
        Ok(collator) => Some(collator),
        Err(error) => {
            tracing::warn!(%error, "root collator unavailable; falling back to case-folded order");
            None
        }
    }
}

thread_local! {
    static ROOT_COLLATOR: Option<CollatorBorrowed<'static>> = root_collator();
}

fn case_folded_compare(lhs: &str, rhs: &str) -> Ordering {
    let folded = lhs
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(rhs.chars().flat_map(char::to_lowercase));
    folded.then_with(|| rhs.cmp(lhs))
}

/// Root-locale collation at tertiary strength: accents and case only break ties.
pub fn locale_compare(lhs: &str, rhs: &str) -> Ordering {
    ROOT_COLLATOR.with(|collator| match collator {
        Some(collator) => collator.compare(lhs, rhs),
        None => case_folded_compare(lhs, rhs),
    })
}

impl SortValue<'_> {
    fn rank(self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::Opaque => 2,
        }
    }
}

/// Total order: values of one kind compare by value in the requested
/// direction, kinds never interleave and opaque values always trail.
fn compare_values(lhs: SortValue<'_>, rhs: SortValue<'_>, order: SortOrder) -> Ordering {
    let directed = |ordering: Ordering| match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    };
    match (lhs, rhs) {
        (SortValue::Text(a), SortValue::Text(b)) => directed(locale_compare(a, b)),
        (SortValue::Number(a), SortValue::Number(b)) => directed(a.total_cmp(&b)),
        _ => lhs.rank().cmp(&rhs.rank()),
    }
}

fn matches_search(truck: &TruckRecord, needle: &str) -> bool {
    needle.is_empty()
        || truck.driver.to_lowercase().contains(needle)
        || truck.plate_number.to_lowercase().contains(needle)
        || truck.location.address.to_lowercase().contains(needle)
}

fn matches_status(truck: &TruckRecord, status: &str) -> bool {
    status.is_empty() || truck.status.as_str() == status
}

pub fn sort_trucks(trucks: &mut [TruckRecord], sort: &str) {
    let spec = SortSpec::parse(sort);
    trucks.sort_by(|a, b| {
        compare_values(
            sort_value(a, spec.field),
            sort_value(b, spec.field),
            spec.order,
        )
    });
}

/// Search, status filter, stable sort, then page slice.
pub fn query_trucks(records: &[TruckRecord], params: &QueryParams) -> TruckPage {
    let needle = params.search.to_lowercase();
    let mut filtered: Vec<TruckRecord> = records
        .iter()
        .filter(|truck| matches_search(truck, &needle))
        .filter(|truck| matches_status(truck, &params.status))
        .cloned()
        .collect();

    sort_trucks(&mut filtered, &params.sort);

    let total = filtered.len();
    let page = params.page.max(1);
    let page_size = params.page_size.max(1);
    let start = (page as usize - 1).saturating_mul(page_size as usize);
    let data = filtered
        .into_iter()
        .skip(start)
        .take(page_size as usize)
        .collect();

    TruckPage {
        data,
        total,
        page,
        page_size,
    }
}
