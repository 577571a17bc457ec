use std::collections::HashSet;

use chrono::NaiveDate;

/// Records that can be reduced to "one per patient per calendar day".
pub trait PatientDay {
    fn patient_id(&self) -> &str;
    fn day(&self) -> NaiveDate;
}

/// Keeps the first record for each (patient, day) in input order.
pub fn one_per_patient_day<T: PatientDay>(records: Vec<T>) -> Vec<T> {
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert((record.patient_id().to_string(), record.day())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        patient: &'static str,
        day: NaiveDate,
        tag: u32,
    }

    impl PatientDay for Row {
        fn patient_id(&self) -> &str {
            self.patient
        }

        fn day(&self) -> NaiveDate {
            self.day
        }
    }

    fn row(patient: &'static str, d: u32, tag: u32) -> Row {
        Row {
            patient,
            day: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
            tag,
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let rows = vec![row("p1", 1, 1), row("p1", 1, 2), row("p2", 1, 3), row("p1", 2, 4)];
        let kept = one_per_patient_day(rows);
        let tags: Vec<u32> = kept.iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec![1, 3, 4]);
    }

    #[test]
    fn dedup_is_idempotent() {
        let rows = vec![row("p1", 1, 1), row("p1", 1, 2), row("p2", 3, 3), row("p2", 3, 4)];
        let once = one_per_patient_day(rows);
        let twice = one_per_patient_day(once.clone());
        assert_eq!(once, twice);
    }
}
