use super::cache::Memo;
use super::group::{ElementIndex, UrlMetricGroup};
use crate::core::{MAX_VIEWPORT_WIDTH, MetricsError, Result, validate_etag};
use crate::metric::{Element, UrlMetric, normalize_xpath};
use log::debug;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Element position across the whole collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElementLocation {
    group: usize,
    index: ElementIndex,
}

#[derive(Debug, Default)]
struct CollectionCache {
    every_group_complete: Memo<bool>,
    any_group_populated: Memo<bool>,
    every_group_populated: Memo<bool>,
    common_lcp_element: Memo<Option<ElementLocation>>,
    max_intersection_ratios: Memo<BTreeMap<String, f64>>,
    minimum_heights: Memo<BTreeMap<String, f64>>,
    xpath_elements: Memo<BTreeMap<String, Vec<ElementLocation>>>,
    positioned_in_viewport: Memo<BTreeMap<String, bool>>,
}

/// URL Metrics for one page, partitioned into breakpoint groups.
///
/// Breakpoints `[b1, …, bn]` yield `n + 1` contiguous groups covering
/// `[0, b1]`, `[b1 + 1, b2]`, …, `[bn + 1, MAX_VIEWPORT_WIDTH]`. Aggregate
/// queries are memoized and invalidated by every [`add_url_metric`] call.
///
/// # Examples
///
/// ```
/// use url_metrics::{UrlMetric, UrlMetricGroupCollection};
/// use serde_json::json;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let etag = "d41d8cd98f00b204e9800998ecf8427e";
/// let mut collection = UrlMetricGroupCollection::new(vec![], etag, &[480, 600], 1, 86400)?;
/// assert_eq!(collection.len(), 3);
///
/// collection.add_url_metric(UrlMetric::from_value(json!({
///     "url": "https://example.com/",
///     "viewport": {"width": 500, "height": 800},
///     "timestamp": url_metrics::current_timestamp(),
///     "etag": etag,
///     "elements": []
/// }))?);
///
/// let group = collection.get_group_for_viewport_width(500)?;
/// assert_eq!(group.minimum_viewport_width(), 481);
/// assert!(group.is_complete());
/// assert!(!collection.is_every_group_complete());
/// # Ok(())
/// # }
/// ```
///
/// [`add_url_metric`]: UrlMetricGroupCollection::add_url_metric
#[derive(Debug)]
pub struct UrlMetricGroupCollection {
    groups: Vec<UrlMetricGroup>,
    breakpoints: Vec<i64>,
    sample_size: usize,
    freshness_ttl: u64,
    current_etag: String,
    generation: u64,
    cache: CollectionCache,
}

impl UrlMetricGroupCollection {
    /// Partition `url_metrics` into breakpoint groups.
    ///
    /// Breakpoints are sorted and deduplicated before validation. Groups
    /// built here keep every URL Metric they are given, even beyond
    /// `sample_size`; trimming happens on the next [`add_url_metric`].
    ///
    /// [`add_url_metric`]: UrlMetricGroupCollection::add_url_metric
    pub fn new(
        url_metrics: Vec<UrlMetric>,
        current_etag: &str,
        breakpoints: &[i64],
        sample_size: i64,
        freshness_ttl: i64,
    ) -> Result<Self> {
        validate_etag(current_etag)?;

        let mut breakpoints = breakpoints.to_vec();
        breakpoints.sort_unstable();
        breakpoints.dedup();
        if let Some(bad) = breakpoints
            .iter()
            .find(|&&breakpoint| breakpoint <= 0 || breakpoint >= MAX_VIEWPORT_WIDTH)
        {
            return Err(MetricsError::InvalidArgument(format!(
                "Each breakpoint must be greater than zero and less than {}, got {}",
                MAX_VIEWPORT_WIDTH, bad
            )));
        }

        let sample_size = usize::try_from(sample_size)
            .ok()
            .filter(|&size| size > 0)
            .ok_or_else(|| {
                MetricsError::InvalidArgument(format!(
                    "Sample size must be greater than zero, got {}",
                    sample_size
                ))
            })?;
        let freshness_ttl = u64::try_from(freshness_ttl).map_err(|_| {
            MetricsError::InvalidArgument(format!(
                "Freshness TTL must be at least zero, got {}",
                freshness_ttl
            ))
        })?;

        let mut partitions: Vec<Vec<UrlMetric>> = vec![Vec::new(); breakpoints.len() + 1];
        for url_metric in url_metrics {
            let index = group_index(&breakpoints, i64::from(url_metric.viewport_width()));
            partitions[index].push(url_metric);
        }

        let mut groups = Vec::with_capacity(partitions.len());
        let mut minimum_viewport_width = 0;
        for (i, partition) in partitions.into_iter().enumerate() {
            let maximum_viewport_width = breakpoints.get(i).copied().unwrap_or(MAX_VIEWPORT_WIDTH);
            groups.push(UrlMetricGroup::new(
                partition,
                minimum_viewport_width,
                maximum_viewport_width,
                sample_size,
                freshness_ttl,
                current_etag,
            )?);
            minimum_viewport_width = maximum_viewport_width.saturating_add(1);
        }

        debug!(
            "Built {} breakpoint groups for ETag {} (sample size {}, TTL {}s)",
            groups.len(),
            current_etag,
            sample_size,
            freshness_ttl
        );

        Ok(Self {
            groups,
            breakpoints,
            sample_size,
            freshness_ttl,
            current_etag: current_etag.to_string(),
            generation: 0,
            cache: CollectionCache::default(),
        })
    }

    pub fn current_etag(&self) -> &str {
        &self.current_etag
    }

    /// Normalized (sorted, deduplicated) breakpoints.
    pub fn breakpoints(&self) -> &[i64] {
        &self.breakpoints
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn freshness_ttl(&self) -> u64 {
        self.freshness_ttl
    }

    /// Number of groups; always one more than the number of breakpoints.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UrlMetricGroup> {
        self.groups.iter()
    }

    pub fn groups(&self) -> &[UrlMetricGroup] {
        &self.groups
    }

    /// Route `url_metric` to the group covering its viewport width.
    pub fn add_url_metric(&mut self, url_metric: UrlMetric) {
        let index = group_index(&self.breakpoints, i64::from(url_metric.viewport_width()));
        self.groups[index].add(url_metric);
        self.generation += 1;
    }

    pub fn get_group_for_viewport_width(&self, viewport_width: i64) -> Result<&UrlMetricGroup> {
        if viewport_width < 0 {
            return Err(MetricsError::InvalidArgument(format!(
                "Viewport width must be at least zero, got {}",
                viewport_width
            )));
        }
        Ok(&self.groups[group_index(&self.breakpoints, viewport_width)])
    }

    /// Group with the smallest viewport range.
    pub fn get_first_group(&self) -> &UrlMetricGroup {
        &self.groups[0]
    }

    /// Group with the largest viewport range.
    pub fn get_last_group(&self) -> &UrlMetricGroup {
        &self.groups[self.groups.len() - 1]
    }

    /// Drop every memoized result of the collection and its groups.
    pub fn clear_cache(&mut self) {
        self.generation += 1;
        for group in &mut self.groups {
            group.clear_cache();
        }
    }

    pub fn is_every_group_complete(&self) -> bool {
        self.cache
            .every_group_complete
            .get_or_compute(self.generation, || {
                self.groups.iter().all(UrlMetricGroup::is_complete)
            })
    }

    pub fn is_any_group_populated(&self) -> bool {
        self.cache
            .any_group_populated
            .get_or_compute(self.generation, || {
                self.groups.iter().any(|group| !group.is_empty())
            })
    }

    pub fn is_every_group_populated(&self) -> bool {
        self.cache
            .every_group_populated
            .get_or_compute(self.generation, || {
                self.groups.iter().all(|group| !group.is_empty())
            })
    }

    /// Groups whose LCP element has the given xpath.
    pub fn get_groups_by_lcp_element(&self, xpath: &str) -> Vec<&UrlMetricGroup> {
        let xpath = normalize_xpath(xpath);
        self.groups
            .iter()
            .filter(|group| {
                group
                    .get_lcp_element()
                    .is_some_and(|element| element.xpath() == xpath)
            })
            .collect()
    }

    /// The LCP element shared by every populated group.
    ///
    /// Both the narrowest and widest groups must be populated and agree on
    /// the LCP xpath; any populated group in between must agree as well. The
    /// element returned comes from the widest group.
    pub fn get_common_lcp_element(&self) -> Option<Element<'_>> {
        let location = self
            .cache
            .common_lcp_element
            .get_or_compute(self.generation, || self.compute_common_lcp_element())?;
        self.element_at(location)
    }

    fn compute_common_lcp_element(&self) -> Option<ElementLocation> {
        let first_group = self.groups.first()?;
        let last_group = self.groups.last()?;
        if first_group.is_empty() || last_group.is_empty() {
            return None;
        }

        let last_index = last_group.lcp_element_index()?;
        let xpath = last_group.element_at(last_index)?.xpath();
        if first_group.get_lcp_element()?.xpath() != xpath {
            return None;
        }

        for group in self.groups.iter().filter(|group| !group.is_empty()) {
            match group.get_lcp_element() {
                Some(element) if element.xpath() == xpath => {}
                _ => return None,
            }
        }

        Some(ElementLocation {
            group: self.groups.len() - 1,
            index: last_index,
        })
    }

    /// Every URL Metric of every group, narrowest group first.
    pub fn get_flattened_url_metrics(&self) -> Vec<&UrlMetric> {
        self.groups.iter().flat_map(UrlMetricGroup::iter).collect()
    }

    /// Every element across all groups keyed by normalized xpath.
    pub fn get_xpath_elements_map(&self) -> BTreeMap<String, Vec<Element<'_>>> {
        self.xpath_element_locations()
            .into_iter()
            .map(|(xpath, locations)| {
                let elements = locations
                    .into_iter()
                    .filter_map(|location| self.element_at(location))
                    .collect();
                (xpath, elements)
            })
            .collect()
    }

    pub fn get_all_element_max_intersection_ratios(&self) -> BTreeMap<String, f64> {
        self.cache
            .max_intersection_ratios
            .get_or_compute(self.generation, || {
                let mut ratios: BTreeMap<String, f64> = BTreeMap::new();
                for group in &self.groups {
                    for (xpath, ratio) in group.get_all_element_max_intersection_ratios() {
                        ratios
                            .entry(xpath)
                            .and_modify(|max| *max = max.max(ratio))
                            .or_insert(ratio);
                    }
                }
                ratios
            })
    }

    pub fn get_element_max_intersection_ratio(&self, xpath: &str) -> Option<f64> {
        self.get_all_element_max_intersection_ratios()
            .get(&normalize_xpath(xpath))
            .copied()
    }

    /// Smallest `boundingClientRect.height` seen per xpath. Occurrences
    /// without a bounding rect are ignored.
    pub fn get_all_element_minimum_heights(&self) -> BTreeMap<String, f64> {
        self.cache.minimum_heights.get_or_compute(self.generation, || {
            let mut heights: BTreeMap<String, f64> = BTreeMap::new();
            for (xpath, elements) in self.get_xpath_elements_map() {
                let minimum = elements
                    .iter()
                    .filter_map(|element| element.bounding_client_rect())
                    .map(|rect| rect.height)
                    .reduce(f64::min);
                if let Some(minimum) = minimum {
                    heights.insert(xpath, minimum);
                }
            }
            heights
        })
    }

    pub fn get_element_minimum_height(&self, xpath: &str) -> Option<f64> {
        self.get_all_element_minimum_heights()
            .get(&normalize_xpath(xpath))
            .copied()
    }

    /// Whether each xpath was positioned in the initial viewport in at least
    /// one URL Metric.
    pub fn get_all_elements_positioned_in_any_initial_viewport(&self) -> BTreeMap<String, bool> {
        self.cache
            .positioned_in_viewport
            .get_or_compute(self.generation, || {
                self.get_xpath_elements_map()
                    .into_iter()
                    .map(|(xpath, elements)| {
                        let positioned = elements
                            .iter()
                            .any(Element::is_positioned_in_initial_viewport);
                        (xpath, positioned)
                    })
                    .collect()
            })
    }

    pub fn is_element_positioned_in_any_initial_viewport(&self, xpath: &str) -> Option<bool> {
        self.get_all_elements_positioned_in_any_initial_viewport()
            .get(&normalize_xpath(xpath))
            .copied()
    }

    fn xpath_element_locations(&self) -> BTreeMap<String, Vec<ElementLocation>> {
        self.cache.xpath_elements.get_or_compute(self.generation, || {
            let mut map: BTreeMap<String, Vec<ElementLocation>> = BTreeMap::new();
            for (g, group) in self.groups.iter().enumerate() {
                for (xpath, indexes) in group.xpath_element_indexes() {
                    map.entry(xpath).or_default().extend(
                        indexes
                            .into_iter()
                            .map(|index| ElementLocation { group: g, index }),
                    );
                }
            }
            map
        })
    }

    fn element_at(&self, location: ElementLocation) -> Option<Element<'_>> {
        self.groups.get(location.group)?.element_at(location.index)
    }

    #[cfg(test)]
    fn has_cached_results(&self) -> bool {
        let cache = &self.cache;
        let generation = self.generation;
        cache.every_group_complete.is_current(generation)
            || cache.any_group_populated.is_current(generation)
            || cache.every_group_populated.is_current(generation)
            || cache.common_lcp_element.is_current(generation)
            || cache.max_intersection_ratios.is_current(generation)
            || cache.minimum_heights.is_current(generation)
            || cache.xpath_elements.is_current(generation)
            || cache.positioned_in_viewport.is_current(generation)
    }
}

/// Index of the group whose range covers `viewport_width`.
fn group_index(breakpoints: &[i64], viewport_width: i64) -> usize {
    breakpoints.partition_point(|&breakpoint| breakpoint < viewport_width)
}

impl<'a> IntoIterator for &'a UrlMetricGroupCollection {
    type Item = &'a UrlMetricGroup;
    type IntoIter = std::slice::Iter<'a, UrlMetricGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

impl Serialize for UrlMetricGroupCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("UrlMetricGroupCollection", 9)?;
        state.serialize_field("current_etag", &self.current_etag)?;
        state.serialize_field("breakpoints", &self.breakpoints)?;
        state.serialize_field("freshness_ttl", &self.freshness_ttl)?;
        state.serialize_field("sample_size", &self.sample_size)?;
        state.serialize_field(
            "all_element_max_intersection_ratios",
            &self.get_all_element_max_intersection_ratios(),
        )?;
        state.serialize_field("common_lcp_element", &self.get_common_lcp_element())?;
        state.serialize_field("every_group_complete", &self.is_every_group_complete())?;
        state.serialize_field("every_group_populated", &self.is_every_group_populated())?;
        state.serialize_field("groups", &self.groups)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::current_timestamp;
    use serde_json::json;

    const ETAG: &str = "d41d8cd98f00b204e9800998ecf8427e";

    fn url_metric(width: u32, elements: serde_json::Value) -> UrlMetric {
        UrlMetric::from_value(json!({
            "url": "https://example.com/",
            "viewport": {"width": width, "height": width.div_ceil(2)},
            "timestamp": current_timestamp(),
            "etag": ETAG,
            "elements": elements,
        }))
        .unwrap()
    }

    #[test]
    fn test_group_index_boundaries() {
        let breakpoints = [480, 600, 782];
        assert_eq!(group_index(&breakpoints, 0), 0);
        assert_eq!(group_index(&breakpoints, 480), 0);
        assert_eq!(group_index(&breakpoints, 481), 1);
        assert_eq!(group_index(&breakpoints, 600), 1);
        assert_eq!(group_index(&breakpoints, 782), 2);
        assert_eq!(group_index(&breakpoints, 783), 3);
        assert_eq!(group_index(&breakpoints, MAX_VIEWPORT_WIDTH), 3);
        assert_eq!(group_index(&[], 1000), 0);
    }

    #[test]
    fn test_add_clears_cache() {
        let mut collection = UrlMetricGroupCollection::new(vec![], ETAG, &[480], 2, 3600).unwrap();
        assert!(!collection.has_cached_results());

        assert!(!collection.is_any_group_populated());
        assert!(collection.get_all_element_max_intersection_ratios().is_empty());
        assert!(collection.get_common_lcp_element().is_none());
        assert!(collection.has_cached_results());

        collection.add_url_metric(url_metric(
            400,
            json!([{"xpath": "/HTML/BODY/IMG", "isLCP": true, "isLCPCandidate": true, "intersectionRatio": 0.5}]),
        ));
        assert!(!collection.has_cached_results());
        assert!(collection.is_any_group_populated());
        assert_eq!(
            collection.get_element_max_intersection_ratio("/HTML/BODY/IMG"),
            Some(0.5)
        );
    }

    #[test]
    fn test_clear_cache_reaches_groups() {
        let mut collection =
            UrlMetricGroupCollection::new(vec![url_metric(400, json!([]))], ETAG, &[480], 1, 3600)
                .unwrap();
        assert!(collection.get_first_group().is_complete());
        assert!(collection.get_first_group().has_cached_results());

        collection.clear_cache();
        assert!(!collection.has_cached_results());
        assert!(!collection.get_first_group().has_cached_results());
    }
}
