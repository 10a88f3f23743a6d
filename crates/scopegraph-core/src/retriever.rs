//! Materialization Tracker
//!
//! The [`Retriever`] decides, per facet, whether an element still needs to be
//! fetched and issues the smallest possible fetch request when it does.
//!
//! # Guarantees
//!
//! - A call whose facets are all present performs no store access.
//! - Any other call performs exactly one store call, for the union of the
//!   missing facets, whatever the number of facets requested.
//! - Store failures are surfaced as [`RetrievalError`] and never treated as an
//!   absent facet. Nothing is retried here.

use crate::element::{Element, ElementId, FacetKind, FacetSet};
use crate::store::{ElementStore, StoreError};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Errors that can occur while materializing facets
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Failed to fetch element {element_id}: {source}")]
    Fetch {
        element_id: ElementId,
        #[source]
        source: StoreError,
    },

    #[error("Element query failed: {source}")]
    Query {
        #[source]
        source: StoreError,
    },

    #[error("Batch fetch of {count} elements failed: {source}")]
    Batch {
        count: usize,
        #[source]
        source: StoreError,
    },

    #[error("Element {element_id} is still missing facets after fetch: {missing}")]
    Incomplete {
        element_id: ElementId,
        missing: FacetSet,
    },
}

/// Counters describing how the retriever has been used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrieverStats {
    /// Number of elements checked for missing facets
    pub checks: u64,
    /// Checks that needed no fetch
    pub hits: u64,
    /// Store calls issued (`fetch` or `fetch_many`)
    pub fetches: u64,
    /// Elements returned by the store
    pub elements_fetched: u64,
}

impl RetrieverStats {
    /// Fraction of checks served without a fetch (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.checks == 0 {
            0.0
        } else {
            self.hits as f64 / self.checks as f64
        }
    }
}

/// Per-facet materialization tracker over an [`ElementStore`]
pub struct Retriever<'a> {
    store: &'a dyn ElementStore,
    stats: Mutex<RetrieverStats>,
}

impl<'a> Retriever<'a> {
    /// Create a retriever fetching from `store`
    pub fn new(store: &'a dyn ElementStore) -> Self {
        Self {
            store,
            stats: Mutex::new(RetrieverStats::default()),
        }
    }

    /// The backing store
    pub fn store(&self) -> &'a dyn ElementStore {
        self.store
    }

    /// Snapshot of the usage counters
    pub fn stats(&self) -> RetrieverStats {
        *self.stats.lock()
    }

    // =========================================================================
    // Presence checks
    // =========================================================================

    /// Check whether `facet` is present on `element` without fetching.
    ///
    /// A missing element satisfies every facet vacuously except the link
    /// facets, which need an existing element. For a present element the
    /// check descends into nested containers: attributes count as present
    /// only if every property group and every property list is fetched.
    pub fn is_facet_present(element: Option<&Element>, facet: FacetKind) -> bool {
        match element {
            Some(element) => element.has_facet(facet),
            None => !facet.requires_element(),
        }
    }

    /// Subset of `facets` not yet present on `element`
    pub fn missing_facets(element: &Element, facets: FacetSet) -> FacetSet {
        facets.iter().filter(|f| !element.has_facet(*f)).collect()
    }

    // =========================================================================
    // Ensure operations
    // =========================================================================

    /// Make sure every facet in `facets` is present on `element`.
    ///
    /// Returns the input untouched when nothing is missing. Otherwise fetches
    /// the missing facets in one call and merges them over the facets the
    /// input already had.
    pub fn ensure(&self, element: Element, facets: FacetSet) -> Result<Element, RetrievalError> {
        let missing = Self::missing_facets(&element, facets);
        if missing.is_empty() {
            self.record(1, 1, 0, 0);
            trace!(element_id = %element.id, %facets, "All facets present");
            return Ok(element);
        }

        debug!(element_id = %element.id, %missing, "Fetching missing facets");
        self.record(1, 0, 1, 0);
        let fresh = self
            .store
            .fetch(element.id, missing)
            .map_err(|source| RetrievalError::Fetch {
                element_id: element.id,
                source,
            })?;
        self.record(0, 0, 0, 1);
        if fresh.id != element.id {
            return Err(RetrievalError::Fetch {
                element_id: element.id,
                source: mismatched(element.id, fresh.id),
            });
        }

        Self::complete(element.absorb(fresh), facets)
    }

    /// Ensure the attributes facet
    pub fn ensure_attributes(&self, element: Element) -> Result<Element, RetrievalError> {
        self.ensure(element, FacetSet::attributes())
    }

    /// Ensure the children facet
    pub fn ensure_children(&self, element: Element) -> Result<Element, RetrievalError> {
        self.ensure(element, FacetSet::children())
    }

    /// Ensure the permissions facet
    pub fn ensure_permissions(&self, element: Element) -> Result<Element, RetrievalError> {
        self.ensure(element, FacetSet::permissions())
    }

    /// Ensure the parent facet
    pub fn ensure_parent(&self, element: Element) -> Result<Element, RetrievalError> {
        self.ensure(element, FacetSet::parent())
    }

    /// Ensure attributes and children with a single fetch
    pub fn ensure_attributes_and_children(
        &self,
        element: Element,
    ) -> Result<Element, RetrievalError> {
        self.ensure(element, FacetSet::attributes() | FacetSet::children())
    }

    /// Ensure outgoing links, and incoming links too when `up_links` is set
    pub fn ensure_links(
        &self,
        element: Element,
        up_links: bool,
    ) -> Result<Element, RetrievalError> {
        let mut facets = FacetSet::from(FacetKind::LinksDown);
        if up_links {
            facets.insert(FacetKind::LinksUp);
        }
        self.ensure(element, facets)
    }

    /// Batch variant of [`ensure`](Self::ensure).
    ///
    /// Complete elements pass through; every other element is fetched in a
    /// single `fetch_many` call requesting the union of what is missing.
    /// Output order matches input order.
    pub fn ensure_all(
        &self,
        elements: Vec<Element>,
        facets: FacetSet,
    ) -> Result<Vec<Element>, RetrievalError> {
        let mut request = FacetSet::EMPTY;
        let mut pending = Vec::new();
        for (pos, element) in elements.iter().enumerate() {
            let missing = Self::missing_facets(element, facets);
            if !missing.is_empty() {
                request = request.union(missing);
                pending.push(pos);
            }
        }

        let checks = elements.len() as u64;
        let hits = checks - pending.len() as u64;
        if pending.is_empty() {
            self.record(checks, hits, 0, 0);
            return Ok(elements);
        }

        let ids: Vec<ElementId> = pending.iter().map(|pos| elements[*pos].id).collect();
        debug!(count = ids.len(), facets = %request, "Batch fetching missing facets");
        self.record(checks, hits, 1, 0);

        let fetched = self
            .store
            .fetch_many(&ids, request)
            .map_err(|source| RetrievalError::Batch {
                count: ids.len(),
                source,
            })?;
        if fetched.len() != ids.len() {
            return Err(RetrievalError::Batch {
                count: ids.len(),
                source: StoreError::InvalidData(format!(
                    "store returned {} elements for {} ids",
                    fetched.len(),
                    ids.len()
                )),
            });
        }
        self.record(0, 0, 0, fetched.len() as u64);

        let mut slots: Vec<Option<Element>> = elements.into_iter().map(Some).collect();
        for (pos, fresh) in pending.into_iter().zip(fetched) {
            if let Some(element) = slots[pos].take() {
                if fresh.id != element.id {
                    return Err(RetrievalError::Batch {
                        count: ids.len(),
                        source: mismatched(element.id, fresh.id),
                    });
                }
                slots[pos] = Some(Self::complete(element.absorb(fresh), facets)?);
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Best-effort variant of [`ensure`](Self::ensure).
    ///
    /// On failure the facets that could not be fetched are marked
    /// `FetchFailed` with the error message instead of failing the caller.
    pub fn ensure_or_mark_failed(&self, element: Element, facets: FacetSet) -> Element {
        let id = element.id;
        let fallback = element.clone();
        match self.ensure(element, facets) {
            Ok(element) => element,
            Err(err) => {
                warn!(element_id = %id, error = %err, "Could not materialize facets");
                let mut element = fallback;
                element.mark_failed(facets, &err.to_string());
                element
            }
        }
    }

    fn complete(element: Element, facets: FacetSet) -> Result<Element, RetrievalError> {
        let missing = Self::missing_facets(&element, facets);
        if missing.is_empty() {
            Ok(element)
        } else {
            Err(RetrievalError::Incomplete {
                element_id: element.id,
                missing,
            })
        }
    }

    fn record(&self, checks: u64, hits: u64, fetches: u64, elements_fetched: u64) {
        let mut stats = self.stats.lock();
        stats.checks += checks;
        stats.hits += hits;
        stats.fetches += fetches;
        stats.elements_fetched += elements_fetched;
    }
}

fn mismatched(requested: ElementId, returned: ElementId) -> StoreError {
    let message = format!("store returned element {returned} for requested id {requested}");
    StoreError::InvalidData(message)
}
