/// Render a base-unit amount with a fixed number of decimal places.
pub fn format_token_amount(amount: u64, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let width = decimals as usize;
    match 10u64.checked_pow(decimals) {
        Some(scale) => format!("{}.{:0width$}", amount / scale, amount % scale),
        // every u64 is below 10^20, so the whole amount is fractional
        None => format!("0.{:0width$}", amount),
    }
}
