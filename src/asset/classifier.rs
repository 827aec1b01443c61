use crate::wallet::{AssetOperation, AssetPayload};
use tracing::debug;

/// True iff the transaction carries no asset payload.
pub fn is_null_asset(payload: Option<&AssetPayload>) -> bool {
	payload.is_none()
}

/// True iff the payload is present, its operation is recognized, and it carries a name
/// whenever the operation requires one.
///
/// Malformed payloads are not errors: they are excluded from asset bookkeeping and only
/// logged for diagnostics.
pub fn is_valid_asset(payload: Option<&AssetPayload>) -> bool {
	let Some(payload) = payload else {
		return false;
	};

	if !payload.operation.is_recognized() {
		debug!("Ignoring asset payload with unrecognized operation {:?}", payload.operation);
		return false;
	}

	let needs_name = matches!(
		payload.operation,
		AssetOperation::Issuance | AssetOperation::Transfer
	);
	if needs_name && payload.name.is_empty() {
		debug!("Ignoring {:?} asset payload without a name", payload.operation);
		return false;
	}

	true
}

/// Operation of a valid payload, `None` for null or malformed payloads.
pub fn classify(payload: Option<&AssetPayload>) -> Option<AssetOperation> {
	if is_valid_asset(payload) {
		payload.map(|p| p.operation)
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_null_asset() {
		assert!(is_null_asset(None));
		let payload = AssetPayload::new(AssetOperation::Transfer, "ROSE", 5);
		assert!(!is_null_asset(Some(&payload)));
		assert!(!is_valid_asset(None));
	}

	#[test]
	fn test_name_required_for_issuance_and_transfer() {
		for op in [AssetOperation::Issuance, AssetOperation::Transfer] {
			assert!(is_valid_asset(Some(&AssetPayload::new(op, "ROSE", 1))));
			assert!(!is_valid_asset(Some(&AssetPayload::new(op, "", 1))));
		}
		// reissuance may omit the name
		assert!(is_valid_asset(Some(&AssetPayload::new(
			AssetOperation::Reissuance,
			"",
			1
		))));
	}

	#[test]
	fn test_unknown_operation_is_invalid() {
		let payload = AssetPayload::new(AssetOperation::Unknown(42), "ROSE", 1);
		assert!(!is_valid_asset(Some(&payload)));
		assert_eq!(classify(Some(&payload)), None);
	}

	#[test]
	fn test_classify_valid() {
		let payload = AssetPayload::new(AssetOperation::Issuance, "ROSE", 1);
		assert_eq!(classify(Some(&payload)), Some(AssetOperation::Issuance));
		assert_eq!(classify(None), None);
	}
}
