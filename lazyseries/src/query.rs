//! Building lazy iterators for a series selection.
//!
//! A selection such as `http_requests_total{job="api"}` is resolved through
//! the store's label index ([`ChunkStore::series`]) into the identities of
//! the matching series. Each identity becomes one [`LazySeriesIterator`]; no
//! samples are fetched until a handle is read.
//!
//! # Pinning
//!
//! Every handle must resolve to exactly one series when it materializes. The
//! matchers it carries are therefore:
//!
//! - the selection's own matchers,
//! - an equality matcher for each of the series' labels, and
//! - `label=""` for every label some *other* selected series carries but this
//!   one does not.
//!
//! Together these exclude every other series in the selection, including
//! series whose label set is a superset of this one.
//!
//! # Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use lazyseries::config::LazySeriesConfig;
//! use lazyseries::context::QueryContext;
//! use lazyseries::iterator::SeriesIterator;
//! use lazyseries::matcher::LabelMatcher;
//! use lazyseries::model::{Metric, SamplePair, Time};
//! use lazyseries::query::lazy_series_iterators;
//! use lazyseries::store::{ChunkStore, MemoryStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = MemoryStore::new();
//! store.append(Metric::new([("__name__", "up"), ("job", "api")]), [SamplePair::new(10, 1.0)]);
//! store.append(Metric::new([("__name__", "up"), ("job", "web")]), [SamplePair::new(10, 0.0)]);
//! let store: Arc<dyn ChunkStore> = Arc::new(store);
//!
//! let handles = lazy_series_iterators(
//!     &store,
//!     &QueryContext::background(),
//!     Time::EARLIEST,
//!     Time::LATEST,
//!     &[LabelMatcher::equal("__name__", "up")],
//!     &LazySeriesConfig::default(),
//! )?;
//! assert_eq!(handles.len(), 2);
//!
//! for handle in &handles {
//!     println!("{} = {:?}", handle.metric(), handle.value_at_or_before_time(Time::LATEST)?);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::LazySeriesConfig;
use crate::context::QueryContext;
use crate::error::{QueryError, Result};
use crate::lazy::LazySeriesIterator;
use crate::matcher::{LabelMatcher, MatchType};
use crate::model::{METRIC_NAME_LABEL, Metric, Time};
use crate::store::ChunkStore;

/// Resolves a selection into one lazy iterator per matching series.
///
/// Only the store's index lookup runs here. Each returned handle fetches
/// its own samples on first access, with `config` governing handles read
/// without an explicit context.
///
/// # Errors
///
/// Returns [`QueryError::MissingMetricNameMatcher`] if `matchers` has no
/// equality matcher on `__name__`, or the store's error if the index lookup
/// fails.
pub fn lazy_series_iterators(
    store: &Arc<dyn ChunkStore>,
    ctx: &QueryContext,
    from: Time,
    through: Time,
    matchers: &[LabelMatcher],
    config: &LazySeriesConfig,
) -> Result<Vec<LazySeriesIterator>> {
    let has_name = matchers
        .iter()
        .any(|m| m.name() == METRIC_NAME_LABEL && m.match_type() == MatchType::Equal);
    if !has_name {
        return Err(QueryError::MissingMetricNameMatcher {
            selection: render_selection(matchers),
        }
        .into());
    }

    let metrics = store.series(ctx, from, through, matchers)?;
    let label_names: BTreeSet<&str> = metrics
        .iter()
        .flat_map(|m| m.labels().map(|(name, _)| name))
        .collect();

    tracing::debug!(
        "selected {} series for {} over [{from}, {through}]",
        metrics.len(),
        render_selection(matchers)
    );

    Ok(metrics
        .iter()
        .map(|metric| {
            let mut pinned = matchers.to_vec();
            pinned.extend(pinning_matchers(metric, &label_names));
            LazySeriesIterator::new(Arc::clone(store), metric.clone(), from, through, pinned)
                .with_config(config.clone())
        })
        .collect())
}

/// Returns matchers that select `metric` and exclude any series carrying a
/// label from `label_names` that `metric` lacks.
///
/// The metric name label is skipped; the lazy iterator looks series up by
/// name already.
pub fn pinning_matchers(metric: &Metric, label_names: &BTreeSet<&str>) -> Vec<LabelMatcher> {
    let own = metric
        .labels()
        .filter(|(name, _)| *name != METRIC_NAME_LABEL)
        .map(|(name, value)| LabelMatcher::equal(name, value));

    let absent = label_names
        .iter()
        .filter(|name| metric.get(name).is_none())
        .map(|name| LabelMatcher::equal(*name, ""));

    own.chain(absent).collect()
}

fn render_selection(matchers: &[LabelMatcher]) -> String {
    let inner = matchers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{inner}}}")
}
