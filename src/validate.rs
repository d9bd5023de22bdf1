/// Compare two track durations and return an advisory when they differ by more
/// than a second. Unknown or zero durations produce no warning. The result is
/// derived on demand and never cached; playback is unaffected either way.
pub fn check_track_durations(
    master_secs: Option<f32>,
    reference_secs: Option<f32>,
) -> Option<String> {
    let a = master_secs?;
    let b = reference_secs?;
    if !a.is_finite() || !b.is_finite() || a <= 0.0 || b <= 0.0 {
        return None;
    }
    let diff = (a - b).abs();
    if diff > 1.0 {
        Some(format!(
            "Track lengths differ by {} seconds. This may affect comparison accuracy.",
            diff.round() as i64
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_warning_when_either_duration_is_unknown() {
        assert_eq!(check_track_durations(None, Some(5.0)), None);
        assert_eq!(check_track_durations(Some(5.0), None), None);
        assert_eq!(check_track_durations(Some(0.0), Some(5.0)), None);
    }

    #[test]
    fn one_second_is_the_boundary() {
        assert_eq!(check_track_durations(Some(5.0), Some(6.0)), None);
        assert_eq!(check_track_durations(Some(5.0), Some(5.5)), None);
        assert!(check_track_durations(Some(5.0), Some(6.01)).is_some());
    }

    #[test]
    fn warning_cites_the_rounded_difference() {
        let msg = check_track_durations(Some(5.0), Some(7.0)).unwrap();
        assert!(msg.contains("2 seconds"), "unexpected message: {msg}");
        let msg = check_track_durations(Some(10.0), Some(7.4)).unwrap();
        assert!(msg.contains("3 seconds"), "unexpected message: {msg}");
    }

    #[test]
    fn order_does_not_matter() {
        assert_eq!(
            check_track_durations(Some(5.0), Some(7.0)),
            check_track_durations(Some(7.0), Some(5.0))
        );
    }
}
