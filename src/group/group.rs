use super::cache::Memo;
use crate::core::{MetricsError, Result, Timestamp, current_timestamp};
use crate::metric::{Element, UrlMetric};
use crate::visitor::generate_media_query;
use log::debug;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Position of an element inside a group: which URL Metric, which element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ElementIndex {
    pub(crate) url_metric: usize,
    pub(crate) element: usize,
}

#[derive(Debug, Clone, Default)]
struct GroupCache {
    is_complete: Memo<bool>,
    lcp_element: Memo<Option<ElementIndex>>,
    max_intersection_ratios: Memo<BTreeMap<String, f64>>,
    xpath_elements: Memo<BTreeMap<String, Vec<ElementIndex>>>,
}

/// URL Metrics captured for viewport widths in `[minimum, maximum]`
///
/// A group holds at most `sample_size` URL Metrics once it has been written
/// to; the oldest ones (by timestamp) are evicted first. Groups built from
/// stored history keep whatever they were given until the next write.
#[derive(Debug, Clone)]
pub struct UrlMetricGroup {
    url_metrics: Vec<UrlMetric>,
    minimum_viewport_width: i64,
    maximum_viewport_width: i64,
    sample_size: usize,
    freshness_ttl: u64,
    current_etag: String,
    generation: u64,
    cache: GroupCache,
}

impl UrlMetricGroup {
    pub fn new(
        url_metrics: Vec<UrlMetric>,
        minimum_viewport_width: i64,
        maximum_viewport_width: i64,
        sample_size: usize,
        freshness_ttl: u64,
        current_etag: impl Into<String>,
    ) -> Result<Self> {
        if minimum_viewport_width < 0 {
            return Err(MetricsError::InvalidArgument(
                "The minimum viewport width must be at least zero".to_string(),
            ));
        }
        if maximum_viewport_width < minimum_viewport_width {
            return Err(MetricsError::InvalidArgument(format!(
                "The maximum viewport width ({}) must not be less than the minimum ({})",
                maximum_viewport_width, minimum_viewport_width
            )));
        }
        if sample_size == 0 {
            return Err(MetricsError::InvalidArgument(
                "Sample size must be greater than zero".to_string(),
            ));
        }
        if let Some(stray) = url_metrics.iter().find(|url_metric| {
            let width = i64::from(url_metric.viewport_width());
            width < minimum_viewport_width || width > maximum_viewport_width
        }) {
            return Err(MetricsError::InvalidArgument(format!(
                "URL Metric with viewport width {} does not belong in group [{}, {}]",
                stray.viewport_width(),
                minimum_viewport_width,
                maximum_viewport_width
            )));
        }

        Ok(Self {
            url_metrics,
            minimum_viewport_width,
            maximum_viewport_width,
            sample_size,
            freshness_ttl,
            current_etag: current_etag.into(),
            generation: 0,
            cache: GroupCache::default(),
        })
    }

    /// Append a URL Metric, evicting the oldest ones while over capacity.
    ///
    /// Range membership is not checked here; the owning collection routes
    /// each URL Metric to the group covering its viewport width.
    pub fn add(&mut self, url_metric: UrlMetric) {
        self.url_metrics.push(url_metric);

        while self.url_metrics.len() > self.sample_size {
            let oldest = self
                .url_metrics
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.timestamp().total_cmp(&b.timestamp()))
                .map(|(index, _)| index);
            let Some(oldest) = oldest else { break };
            let evicted = self.url_metrics.remove(oldest);
            debug!(
                "Evicted URL Metric captured at {} from group [{}, {}]",
                evicted.timestamp(),
                self.minimum_viewport_width,
                self.maximum_viewport_width
            );
        }

        self.clear_cache();
    }

    /// Drop every memoized result of this group.
    pub fn clear_cache(&mut self) {
        self.generation += 1;
    }

    pub fn minimum_viewport_width(&self) -> i64 {
        self.minimum_viewport_width
    }

    /// Inclusive upper bound; [`MAX_VIEWPORT_WIDTH`](crate::core::MAX_VIEWPORT_WIDTH)
    /// for the widest group.
    pub fn maximum_viewport_width(&self) -> i64 {
        self.maximum_viewport_width
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn freshness_ttl(&self) -> u64 {
        self.freshness_ttl
    }

    pub fn current_etag(&self) -> &str {
        &self.current_etag
    }

    pub fn contains_viewport_width(&self, viewport_width: i64) -> bool {
        viewport_width >= self.minimum_viewport_width && viewport_width <= self.maximum_viewport_width
    }

    /// Media query matching this group's viewport range; `None` when the
    /// range covers every width.
    pub fn media_query(&self) -> Option<String> {
        generate_media_query(
            Some(self.minimum_viewport_width),
            Some(self.maximum_viewport_width),
        )
    }

    pub fn len(&self) -> usize {
        self.url_metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.url_metrics.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UrlMetric> {
        self.url_metrics.iter()
    }

    pub fn url_metrics(&self) -> &[UrlMetric] {
        &self.url_metrics
    }

    /// Whether the group has a full sample of fresh URL Metrics captured
    /// under the current ETag. Memoized until the group changes.
    pub fn is_complete(&self) -> bool {
        self.cache
            .is_complete
            .get_or_compute(self.generation, || self.is_complete_at(current_timestamp()))
    }

    /// Uncached completeness check against the supplied clock.
    pub fn is_complete_at(&self, now: Timestamp) -> bool {
        if self.url_metrics.len() < self.sample_size {
            return false;
        }
        let oldest_fresh = now - self.freshness_ttl as f64;
        self.url_metrics.iter().all(|url_metric| {
            url_metric.etag() == self.current_etag && url_metric.timestamp() >= oldest_fresh
        })
    }

    /// Every element of every URL Metric, with this group as owner.
    pub fn elements(&self) -> impl Iterator<Item = Element<'_>> + '_ {
        self.url_metrics.iter().flat_map(move |url_metric| {
            url_metric
                .element_data()
                .iter()
                .map(move |data| Element::new(data, url_metric, Some(self)))
        })
    }

    /// The LCP element most URL Metrics in this group agree on.
    ///
    /// Each URL Metric contributes its first element flagged as LCP. Ties go
    /// to the xpath seen first, and the element returned is the last
    /// occurrence of the winning xpath.
    pub fn get_lcp_element(&self) -> Option<Element<'_>> {
        self.lcp_element_index()
            .and_then(|index| self.element_at(index))
    }

    pub fn get_all_element_max_intersection_ratios(&self) -> BTreeMap<String, f64> {
        self.cache
            .max_intersection_ratios
            .get_or_compute(self.generation, || {
                let mut ratios: BTreeMap<String, f64> = BTreeMap::new();
                for element in self.elements() {
                    ratios
                        .entry(element.xpath().to_string())
                        .and_modify(|max| *max = max.max(element.intersection_ratio()))
                        .or_insert(element.intersection_ratio());
                }
                ratios
            })
    }

    pub fn get_element_max_intersection_ratio(&self, xpath: &str) -> Option<f64> {
        let xpath = crate::metric::normalize_xpath(xpath);
        self.get_all_element_max_intersection_ratios().get(&xpath).copied()
    }

    /// Every element in this group keyed by normalized xpath.
    pub fn get_xpath_elements_map(&self) -> BTreeMap<String, Vec<Element<'_>>> {
        self.xpath_element_indexes()
            .into_iter()
            .map(|(xpath, indexes)| {
                let elements = indexes
                    .into_iter()
                    .filter_map(|index| self.element_at(index))
                    .collect();
                (xpath, elements)
            })
            .collect()
    }

    pub(crate) fn xpath_element_indexes(&self) -> BTreeMap<String, Vec<ElementIndex>> {
        self.cache.xpath_elements.get_or_compute(self.generation, || {
            let mut map: BTreeMap<String, Vec<ElementIndex>> = BTreeMap::new();
            for (m, url_metric) in self.url_metrics.iter().enumerate() {
                for (e, element) in url_metric.element_data().iter().enumerate() {
                    map.entry(element.xpath().to_string())
                        .or_default()
                        .push(ElementIndex { url_metric: m, element: e });
                }
            }
            map
        })
    }

    pub(crate) fn lcp_element_index(&self) -> Option<ElementIndex> {
        self.cache
            .lcp_element
            .get_or_compute(self.generation, || self.compute_lcp_element_index())
    }

    pub(crate) fn element_at(&self, index: ElementIndex) -> Option<Element<'_>> {
        let url_metric = self.url_metrics.get(index.url_metric)?;
        let data = url_metric.element_data().get(index.element)?;
        Some(Element::new(data, url_metric, Some(self)))
    }

    fn compute_lcp_element_index(&self) -> Option<ElementIndex> {
        // (xpath, votes, last occurrence), in first-seen order
        let mut tallies: Vec<(&str, usize, ElementIndex)> = Vec::new();

        for (m, url_metric) in self.url_metrics.iter().enumerate() {
            let Some((e, element)) = url_metric
                .element_data()
                .iter()
                .enumerate()
                .find(|(_, element)| element.is_lcp())
            else {
                continue;
            };

            let index = ElementIndex { url_metric: m, element: e };
            match tallies.iter_mut().find(|(xpath, _, _)| *xpath == element.xpath()) {
                Some(tally) => {
                    tally.1 += 1;
                    tally.2 = index;
                }
                None => tallies.push((element.xpath(), 1, index)),
            }
        }

        let mut winner: Option<&(&str, usize, ElementIndex)> = None;
        for tally in &tallies {
            if winner.is_none_or(|best| tally.1 > best.1) {
                winner = Some(tally);
            }
        }
        winner.map(|(_, _, index)| *index)
    }

    #[cfg(test)]
    pub(crate) fn has_cached_results(&self) -> bool {
        self.cache.is_complete.is_current(self.generation)
            || self.cache.lcp_element.is_current(self.generation)
            || self.cache.max_intersection_ratios.is_current(self.generation)
            || self.cache.xpath_elements.is_current(self.generation)
    }
}

impl<'a> IntoIterator for &'a UrlMetricGroup {
    type Item = &'a UrlMetric;
    type IntoIter = std::slice::Iter<'a, UrlMetric>;

    fn into_iter(self) -> Self::IntoIter {
        self.url_metrics.iter()
    }
}

impl Serialize for UrlMetricGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UrlMetricGroup", 7)?;
        state.serialize_field("freshness_ttl", &self.freshness_ttl)?;
        state.serialize_field("sample_size", &self.sample_size)?;
        state.serialize_field("minimum_viewport_width", &self.minimum_viewport_width)?;
        state.serialize_field("maximum_viewport_width", &self.maximum_viewport_width)?;
        state.serialize_field("lcp_element", &self.get_lcp_element())?;
        state.serialize_field("complete", &self.is_complete())?;
        state.serialize_field("url_metrics", &self.url_metrics)?;
        state.end()
    }
}
