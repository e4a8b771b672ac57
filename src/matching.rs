use chrono::NaiveDate;

use crate::models::CandleSeries;

/// Hit status per entry level, index-aligned with the input entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntryHits {
    pub hit: Vec<bool>,
    pub hit_date: Vec<Option<NaiveDate>>,
}

impl EntryHits {
    fn unhit(n: usize) -> Self {
        Self {
            hit: vec![false; n],
            hit_date: vec![None; n],
        }
    }

    pub fn any_hit(&self) -> bool {
        self.hit.iter().any(|h| *h)
    }
}

/// Walk daily candles in chronological order and mark which entry levels
/// were touched, and on which day.
///
/// Entries are ordered from the highest price (index 0) down. When a
/// candle's low reaches entry `i`, every unhit entry above it is marked hit
/// with the same date: price cannot have reached the deeper level without
/// passing through the shallower ones, even if no stored candle recorded
/// that exact touch.
///
/// Candle input order does not matter; the series is sorted internally.
/// Malformed candles are skipped individually.
pub fn match_entries(entries: &[f64], candles: &CandleSeries) -> EntryHits {
    let mut hits = EntryHits::unhit(entries.len());
    if entries.is_empty() || candles.is_empty() {
        return hits;
    }

    for candle in &candles.sorted_by_time() {
        if !candle.is_well_formed() {
            continue;
        }
        if hits.hit.iter().all(|h| *h) {
            break;
        }

        let date = candle.date();
        for (idx, entry) in entries.iter().enumerate() {
            if !hits.hit[idx] && candle.low <= *entry {
                hits.hit[idx] = true;
                hits.hit_date[idx] = Some(date);

                // Cascade to every shallower entry the data missed.
                for above in 0..idx {
                    if !hits.hit[above] {
                        hits.hit[above] = true;
                        hits.hit_date[above] = Some(date);
                    }
                }
            }
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandleSeries;
    use crate::test_helpers::make_daily_candles;

    #[test]
    fn single_candle_hits_matching_entry() {
        // low 9.4 touches 9.5 but not 9.0
        let candles = make_daily_candles(&[(10.0, 10.5, 9.4, 10.2)]);
        let hits = match_entries(&[9.5, 9.0], &candles);
        assert_eq!(hits.hit, vec![true, false]);
        assert!(hits.hit_date[0].is_some());
        assert_eq!(hits.hit_date[1], None);
    }

    #[test]
    fn deep_touch_cascades_to_all_shallower_entries() {
        let candles = make_daily_candles(&[(100.0, 101.0, 79.0, 95.0)]);
        let hits = match_entries(&[95.0, 90.0, 80.0], &candles);
        assert_eq!(hits.hit, vec![true, true, true]);
        let date = hits.hit_date[2];
        assert!(date.is_some());
        assert_eq!(hits.hit_date[0], date);
        assert_eq!(hits.hit_date[1], date);
    }

    #[test]
    fn earliest_touch_wins_per_entry() {
        // day 0 touches only the first entry, day 2 touches the second
        let candles = make_daily_candles(&[
            (10.0, 10.5, 9.9, 10.2),
            (10.2, 10.6, 10.0, 10.4),
            (10.4, 10.5, 9.4, 9.6),
        ]);
        let hits = match_entries(&[10.0, 9.5], &candles);
        assert_eq!(hits.hit, vec![true, true]);
        assert!(hits.hit_date[0].unwrap() < hits.hit_date[1].unwrap());
    }

    #[test]
    fn shuffled_input_matches_chronological_input() {
        let ordered = make_daily_candles(&[
            (10.0, 10.5, 9.9, 10.2),
            (10.2, 10.6, 10.0, 10.4),
            (10.4, 10.5, 9.4, 9.6),
            (9.6, 10.0, 9.5, 9.8),
        ]);
        let entries = [10.0, 9.5];
        let expected = match_entries(&entries, &ordered);

        let reversed = CandleSeries::new(ordered.iter().rev().cloned().collect());
        assert_eq!(match_entries(&entries, &reversed), expected);

        let mut shuffled: Vec<_> = ordered.iter().cloned().collect();
        shuffled.swap(0, 2);
        shuffled.swap(1, 3);
        assert_eq!(
            match_entries(&entries, &CandleSeries::new(shuffled)),
            expected
        );
    }

    #[test]
    fn malformed_candles_are_skipped() {
        let mut candles = make_daily_candles(&[(10.0, 10.5, 9.9, 10.2)]);
        let mut bad = candles[0].clone();
        bad.low = f64::NAN;
        candles.push(bad);
        let mut zero = candles[0].clone();
        zero.low = 0.0;
        candles.push(zero);

        let hits = match_entries(&[9.5], &candles);
        assert_eq!(hits.hit, vec![false]);
    }

    #[test]
    fn empty_inputs() {
        let candles = make_daily_candles(&[(10.0, 10.5, 9.0, 10.2)]);
        let no_entries = match_entries(&[], &candles);
        assert!(no_entries.hit.is_empty());
        assert!(no_entries.hit_date.is_empty());

        let no_candles = match_entries(&[9.5], &CandleSeries::default());
        assert_eq!(no_candles.hit, vec![false]);
        assert_eq!(no_candles.hit_date, vec![None]);
    }
}
