/// Calculate Simple Moving Average (SMA) over the last `period` values
///
/// Returns `None` when there are fewer than `period` values, or when
/// `period` is zero.
pub fn calculate_sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}
