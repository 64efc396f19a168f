//! Operator prompts needed before a run. Returning `None` cancels.

use futures::future::BoxFuture;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AslaasRequest {
    pub account_no: String,
    pub account_name: String,
    pub suggested: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DopChequeRequest {
    pub list_ordinal: usize,
    pub list_name: String,
    pub account_no: String,
    pub account_name: String,
    pub installment: u32,
    pub suggested_cheque_no: String,
    pub suggested_payment_account_no: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DopChequeResponse {
    pub cheque_no: String,
    pub payment_account_no: String,
}

pub trait AuxiliaryInput: Send + Sync {
    /// ASLAAS number for an account that has none. `None` or blank declines.
    fn request_aslaas<'a>(&'a self, request: &'a AslaasRequest) -> BoxFuture<'a, Option<String>>;

    /// Cheque details for one DOP cheque entry. `None` cancels the whole run.
    fn request_dop_cheque<'a>(
        &'a self,
        request: &'a DopChequeRequest,
    ) -> BoxFuture<'a, Option<DopChequeResponse>>;
}

/// Answers every prompt with fixed values.
#[derive(Debug, Clone, Default)]
pub struct StaticAuxiliaryInput {
    aslaas: Option<String>,
    cheque: Option<DopChequeResponse>,
}

impl StaticAuxiliaryInput {
    /// Declines every prompt.
    pub fn declining() -> Self {
        Self::default()
    }

    /// Accepts ASLAAS suggestions and reuses suggested cheque details,
    /// falling back to `cheque` when nothing is suggested yet.
    pub fn accepting(cheque: Option<DopChequeResponse>) -> Self {
        Self {
            aslaas: Some(String::new()),
            cheque,
        }
    }

    pub fn with_aslaas(mut self, aslaas: impl Into<String>) -> Self {
        self.aslaas = Some(aslaas.into());
        self
    }
}

impl AuxiliaryInput for StaticAuxiliaryInput {
    fn request_aslaas<'a>(&'a self, request: &'a AslaasRequest) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let answer = self.aslaas.as_ref()?;
            if answer.trim().is_empty() {
                Some(request.suggested.clone())
            } else {
                Some(answer.clone())
            }
        })
    }

    fn request_dop_cheque<'a>(
        &'a self,
        request: &'a DopChequeRequest,
    ) -> BoxFuture<'a, Option<DopChequeResponse>> {
        Box::pin(async move {
            let fallback = self.cheque.as_ref()?;
            let pick = |suggested: &str, fallback: &str| {
                if suggested.trim().is_empty() {
                    fallback.to_owned()
                } else {
                    suggested.to_owned()
                }
            };
            Some(DopChequeResponse {
                cheque_no: pick(&request.suggested_cheque_no, &fallback.cheque_no),
                payment_account_no: pick(
                    &request.suggested_payment_account_no,
                    &fallback.payment_account_no,
                ),
            })
        })
    }
}
