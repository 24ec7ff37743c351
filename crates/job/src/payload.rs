use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A ledger transaction to submit on behalf of an organisation.
///
/// The queue never looks inside this value; it is serialized into the job
/// payload at enqueue time and handed back to the submission handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransaction {
    /// MSP id of the organisation whose identity signs the transaction
    pub mspid: String,
    pub transaction_name: String,
    #[serde(default)]
    pub transaction_args: Vec<String>,
    /// Private data passed to the contract without being recorded on the ledger
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transient_data: BTreeMap<String, String>,
}

impl SubmitTransaction {
    pub fn new(mspid: impl Into<String>, transaction_name: impl Into<String>) -> Self {
        SubmitTransaction {
            mspid: mspid.into(),
            transaction_name: transaction_name.into(),
            transaction_args: Vec::new(),
            transient_data: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.transaction_args.push(value.into());
        self
    }

    pub fn transient(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transient_data.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_transaction_wire_shape() {
        let tx = SubmitTransaction::new("AirtelMSP", "CreateAsset")
            .arg("asset7")
            .arg("red");

        assert_eq!(
            serde_json::to_value(&tx).unwrap(),
            json!({
                "mspid": "AirtelMSP",
                "transactionName": "CreateAsset",
                "transactionArgs": ["asset7", "red"],
            })
        );
    }

    #[test]
    fn test_missing_args_default_to_empty() {
        let tx: SubmitTransaction =
            serde_json::from_value(json!({"mspid": "JioMSP", "transactionName": "InitLedger"}))
                .unwrap();
        assert!(tx.transaction_args.is_empty());
        assert!(tx.transient_data.is_empty());
    }
}
