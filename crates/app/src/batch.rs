use std::sync::Arc;

use mledger_core::Money;
use mledger_ocr::OcrBackend;
use mledger_pdf::{PasswordCorpus, PdfBackend};
use tokio::sync::{mpsc, Semaphore};

use crate::pipeline::{Document, DocumentFailure, Pipeline, StatementReport};

type Outcome = (usize, Result<StatementReport, DocumentFailure>);

/// Per-batch results, owned by the collector task while the batch runs.
#[derive(Debug, Default)]
pub struct BatchLedger {
    /// In submission order.
    pub reports: Vec<StatementReport>,
    pub failures: Vec<DocumentFailure>,
    /// Documents whose worker panicked or whose outcome never reached the collector.
    pub crashed: Vec<String>,
}

impl BatchLedger {
    pub fn transaction_count(&self) -> usize {
        self.reports.iter().map(|r| r.ledger.len()).sum()
    }

    pub fn net_balance(&self) -> Money {
        self.reports.iter().map(|r| r.ledger.summary.net_balance).sum()
    }

    pub fn documents(&self) -> usize {
        self.reports.len() + self.failures.len() + self.crashed.len()
    }
}

/// Process every document, at most `workers` at a time.
///
/// Each document runs on the blocking pool; outcomes flow over a channel to a
/// single collector. A failed document never stops the rest of the batch.
pub async fn run_batch<B, R>(
    pipeline: Arc<Pipeline<B, R>>,
    corpus: Arc<PasswordCorpus>,
    documents: Vec<Document>,
) -> BatchLedger
where
    B: PdfBackend + 'static,
    R: OcrBackend + 'static,
{
    let workers = pipeline.config().workers.max(1);
    let semaphore = Arc::new(Semaphore::new(workers));
    let (tx, mut rx) = mpsc::channel::<Outcome>(workers);
    tracing::info!(documents = documents.len(), workers, "batch started");

    let collector = tokio::spawn(async move {
        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    });

    let mut crashed = Vec::new();
    let mut handles = Vec::with_capacity(documents.len());
    for (index, doc) in documents.into_iter().enumerate() {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let (tx, pipeline, corpus) = (tx.clone(), pipeline.clone(), corpus.clone());
        let document_id = doc.id();
        let handle = tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || pipeline.process(&doc, &corpus)).await;
            drop(permit);
            match result {
                Ok(outcome) => forward(&tx, index, outcome, document_id).await,
                Err(e) => {
                    tracing::error!(document = %document_id, error = %e, "worker crashed");
                    Some(document_id)
                }
            }
        });
        handles.push(handle);
    }
    drop(tx);

    for handle in handles {
        if let Ok(Some(id)) = handle.await {
            crashed.push(id);
        }
    }

    let mut outcomes = match collector.await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            tracing::error!(error = %e, "batch collector crashed");
            Vec::new()
        }
    };
    outcomes.sort_by_key(|(index, _)| *index);

    let mut ledger = BatchLedger { crashed, ..Default::default() };
    for (_, outcome) in outcomes {
        match outcome {
            Ok(report) => ledger.reports.push(report),
            Err(failure) => ledger.failures.push(failure),
        }
    }
    tracing::info!(
        succeeded = ledger.reports.len(),
        failed = ledger.failures.len(),
        transactions = ledger.transaction_count(),
        "batch finished"
    );
    ledger
}

/// Hand a finished document to the collector. A lost outcome is reported
/// back as the document id so the batch still counts it as crashed.
async fn forward<T>(
    tx: &mpsc::Sender<(usize, T)>,
    index: usize,
    outcome: T,
    document_id: String,
) -> Option<String> {
    match tx.send((index, outcome)).await {
        Ok(()) => None,
        Err(e) => {
            tracing::error!(document = %document_id, error = %e, "outcome lost, collector gone");
            Some(document_id)
        }
    }
}
