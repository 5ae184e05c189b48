// Per-request transaction tokens for the gateway session protocol.
use getrandom::u64 as random_u64;

use crate::core::error::{ApiResult, Error, ErrorKind};

pub const TOKEN_HEX_LEN: usize = 16;

/// Fresh random 64-bit token as fixed-width lowercase hex.
///
/// Uniqueness is best-effort; the gateway routes by session/handle path.
pub fn transaction_token() -> ApiResult<String> {
    let value = random_u64().map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to generate transaction token: {err}"))
    })?;
    Ok(format_token(value))
}

fn format_token(value: u64) -> String {
    format!("{value:0width$x}", width = TOKEN_HEX_LEN)
}
