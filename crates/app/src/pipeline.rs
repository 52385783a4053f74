use std::fmt;
use std::path::Path;

use mledger_core::{reconcile, Ledger, LedgerError, ParseWarning};
use mledger_import::{resolve_blocks, Classifier, RecordTokenizer};
use mledger_ocr::OcrBackend;
use mledger_pdf::{
    document_id, DecryptError, ExtractError, PasswordCorpus, PasswordResolver, PasswordSource,
    PdfBackend, TextExtractor, Unlocked,
};
use serde::Serialize;
use thiserror::Error;

use crate::config::PipelineConfig;

/// A statement to process: its bytes plus what the caller knows about it.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub password: Option<String>,
}

impl Document {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, file_name: None, password: None }
    }

    pub fn named(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: Some(file_name.into()), ..Self::new(bytes) }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => Self::named(name, bytes),
            None => Self::new(bytes),
        })
    }

    pub fn id(&self) -> String {
        document_id(self.file_name.as_deref(), &self.bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decrypt,
    Extract,
    Tokenize,
    Reconcile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Decrypt => "decrypt",
            Stage::Extract => "extract",
            Stage::Tokenize => "tokenize",
            Stage::Reconcile => "reconcile",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decryption(#[from] DecryptError),
    #[error(transparent)]
    Extraction(#[from] ExtractError),
    #[error("No transactions found ({discarded} blocks discarded)")]
    NoTransactionsFound { discarded: usize },
    #[error(transparent)]
    Reconcile(#[from] LedgerError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Decryption(_) => Stage::Decrypt,
            PipelineError::Extraction(_) => Stage::Extract,
            PipelineError::NoTransactionsFound { .. } => Stage::Tokenize,
            PipelineError::Reconcile(_) => Stage::Reconcile,
        }
    }
}

/// A document that could not produce a ledger.
#[derive(Debug, Error)]
#[error("{document_id}: {stage} failed: {source}")]
pub struct DocumentFailure {
    pub document_id: String,
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

/// Everything one statement produced.
#[derive(Debug, Clone, Serialize)]
pub struct StatementReport {
    pub document_id: String,
    pub ledger: Ledger,
    pub warnings: Vec<ParseWarning>,
    /// Blocks dropped for lacking an amount and balance.
    pub discarded: usize,
    pub password_source: PasswordSource,
    pub password_attempts: usize,
    pub pages: usize,
    pub ocr_pages: usize,
}

/// Decrypt, extract, tokenize, classify and reconcile one statement at a time.
pub struct Pipeline<B, R> {
    backend: B,
    recognizer: R,
    config: PipelineConfig,
    tokenizer: RecordTokenizer,
    classifier: Classifier,
}

impl<B: PdfBackend, R: OcrBackend> Pipeline<B, R> {
    pub fn new(backend: B, recognizer: R, config: PipelineConfig) -> Self {
        Self {
            tokenizer: RecordTokenizer::new(&config.parser),
            classifier: Classifier::new(&config.parser),
            backend,
            recognizer,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process(
        &self,
        doc: &Document,
        corpus: &PasswordCorpus,
    ) -> Result<StatementReport, DocumentFailure> {
        let document_id = doc.id();
        match self.run(doc, corpus, &document_id) {
            Ok(report) => Ok(report),
            Err(source) => {
                let stage = source.stage();
                tracing::warn!(document = %document_id, %stage, error = %source, "statement failed");
                Err(DocumentFailure { document_id, stage, source })
            }
        }
    }

    fn run(
        &self,
        doc: &Document,
        corpus: &PasswordCorpus,
        document_id: &str,
    ) -> Result<StatementReport, PipelineError> {
        let Unlocked { pages, source, attempts, .. } =
            PasswordResolver::new(&self.backend, &self.config.passwords).resolve(
                &doc.bytes,
                doc.file_name.as_deref(),
                doc.password.as_deref(),
                corpus,
            )?;
        tracing::info!(document = %document_id, %source, attempts, "statement unlocked");

        let extraction = TextExtractor::new(&self.recognizer).extract(&*pages)?;
        // Decrypted content is released before parsing starts.
        drop(pages);
        tracing::info!(
            document = %document_id,
            pages = extraction.page_count,
            ocr_pages = extraction.ocr_pages,
            lines = extraction.lines.len(),
            "text extracted"
        );

        let tokenized = self
            .tokenizer
            .tokenize(extraction.lines.iter().map(|l| l.text.as_str()));
        let mut warnings = extraction.warnings;
        warnings.extend(tokenized.warnings);

        let (raws, unresolved) = resolve_blocks(tokenized.blocks);
        warnings.extend(unresolved);
        let discarded = warnings
            .iter()
            .filter(|w| matches!(w, ParseWarning::BlockDiscarded { .. }))
            .count();
        if raws.is_empty() {
            return Err(PipelineError::NoTransactionsFound { discarded });
        }

        let classified = self.classifier.classify(raws);
        warnings.extend(classified.warnings);

        let reconciliation = reconcile(classified.transactions, &self.config.reconcile)?;
        warnings.extend(reconciliation.warnings);
        let ledger = reconciliation.ledger;
        tracing::info!(
            document = %document_id,
            transactions = ledger.len(),
            discarded,
            flagged = ledger.flagged().count(),
            "statement reconciled"
        );

        Ok(StatementReport {
            document_id: document_id.to_string(),
            ledger,
            warnings,
            discarded,
            password_source: source,
            password_attempts: attempts,
            pages: extraction.page_count,
            ocr_pages: extraction.ocr_pages,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use mledger_core::{Category, Money, ReconcileMode};
    use mledger_ocr::{MockRecognizer, UnavailableRecognizer};
    use mledger_pdf::fixture::{self, CellLayout, FixturePage, ScanImage};
    use mledger_pdf::{LopdfBackend, MockPage, MockPdfBackend};

    pub(crate) const STATEMENT: &str = "\
MPESA FULL STATEMENT
Receipt No. Completion Time Details Transaction Status Paid In Withdrawn Balance
AB12CD34 2024-01-05 10:30:00 Received from JOHN DOE Completed 1,000.00 5,000.00
Pay Bill Charge Completed 30.00 4,970.00
QX99ZZ11 05/01/2024 14:02 Customer Transfer to 0712***678 - JANE DOE
Completed -1,500.00 3,470.00
QW77RR22 2024-01-06 08:00:00 Airtime Purchase Completed -100.00 3,370.00
";

    fn scan() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(40, 20, |x, _| Luma([if x % 4 == 0 { 30 } else { 230 }])))
    }

    fn pipeline(backend: MockPdfBackend) -> Pipeline<MockPdfBackend, UnavailableRecognizer> {
        Pipeline::new(backend, UnavailableRecognizer, PipelineConfig::default())
    }

    fn statement_doc() -> Document {
        Document::named("MPESA_Statement_2024.pdf", b"%PDF-1.7 fixture".to_vec())
    }

    #[test]
    fn text_statement_becomes_a_reconciled_ledger() {
        let p = pipeline(MockPdfBackend::new(vec![MockPage::text(STATEMENT)]));
        let report = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap();
        let txs = &report.ledger.transactions;

        assert_eq!(txs.len(), 4);
        assert_eq!(txs[0].category, Category::Income);
        assert_eq!(txs[0].amount, Money::from_cents(100_000));
        assert_eq!(txs[0].balance, Some(Money::from_cents(500_000)));
        assert_eq!(txs[1].category, Category::Charge);
        assert_eq!(txs[1].parent_receipt.as_deref(), Some("AB12CD34"));
        assert_eq!(txs[2].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(txs[2].category, Category::Expense);
        assert!(txs.iter().all(|t| !t.reconciliation_warning));

        let s = &report.ledger.summary;
        assert_eq!(s.opening_balance, Money::from_cents(400_000));
        assert_eq!(s.income_total, Money::from_cents(100_000));
        assert_eq!(s.expense_total, Money::from_cents(160_000));
        assert_eq!(s.charge_total, Money::from_cents(3_000));
        assert_eq!(s.net_balance, Money::from_cents(-63_000));
        assert_eq!(report.password_source, PasswordSource::NoPassword);
        assert_eq!(report.discarded, 0);
        assert_eq!(report.document_id.split('@').next(), Some("MPESA_Statement_2024.pdf"));
    }

    #[test]
    fn every_parent_receipt_names_a_non_charge_record() {
        let p = pipeline(MockPdfBackend::new(vec![MockPage::text(STATEMENT)]));
        let report = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap();
        let txs = &report.ledger.transactions;
        for t in txs.iter().filter_map(|t| t.parent_receipt.as_deref()) {
            assert!(txs.iter().any(|p| p.receipt_id == t && !p.category.is_charge()));
        }
    }

    #[test]
    fn locked_statement_opens_with_corpus_password() {
        let p = pipeline(MockPdfBackend::locked(vec![MockPage::text(STATEMENT)], "s3cret"));
        let corpus = PasswordCorpus::new(vec!["wrong".into(), "s3cret".into()]);
        let report = p.process(&statement_doc(), &corpus).unwrap();
        assert_eq!(report.password_source, PasswordSource::Corpus);
        assert_eq!(report.password_attempts, 3);
        assert_eq!(report.ledger.len(), 4);
    }

    #[test]
    fn unknown_password_is_a_decrypt_failure() {
        let p = pipeline(MockPdfBackend::locked(vec![MockPage::text(STATEMENT)], "not-in-corpus"));
        let corpus = PasswordCorpus::new(vec!["alpha".into(), "beta".into()]);
        let failure = p.process(&statement_doc(), &corpus).unwrap_err();

        assert_eq!(failure.stage, Stage::Decrypt);
        assert_eq!(failure.document_id, statement_doc().id());
        match failure.source {
            // no password + 2 corpus + 5 built-in defaults
            PipelineError::Decryption(DecryptError::Exhausted { attempts }) => assert_eq!(attempts, 8),
            other => panic!("unexpected failure: {other}"),
        }
    }

    #[test]
    fn scanned_page_falls_back_to_ocr() {
        let backend = MockPdfBackend::new(vec![MockPage::scanned(scan())]);
        let recognizer = MockRecognizer::new(STATEMENT);
        let p = Pipeline::new(backend, recognizer, PipelineConfig::default());
        let report = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap();

        assert_eq!(report.ocr_pages, 1);
        assert_eq!(report.pages, 1);
        assert_eq!(report.ledger.len(), 4);
    }

    #[test]
    fn single_amount_block_is_discarded_and_counted() {
        let text = "\
AB12CD34 2024-01-05 10:30:00 Received from JOHN DOE Completed 1,000.00 5,000.00
QQ11WW22 2024-01-05 11:00:00 Reversal pending Completed 250.00
";
        let p = pipeline(MockPdfBackend::new(vec![MockPage::text(text)]));
        let report = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap();
        assert_eq!(report.ledger.len(), 1);
        assert_eq!(report.discarded, 1);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, ParseWarning::BlockDiscarded { receipt_id, tokens: 1 } if receipt_id == "QQ11WW22")));
    }

    #[test]
    fn text_without_records_is_no_transactions_found() {
        let p = pipeline(MockPdfBackend::new(vec![MockPage::text(
            "MPESA FULL STATEMENT\nQQ11WW22 2024-01-05 11:00:00 Pending Completed 250.00",
        )]));
        let failure = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap_err();
        assert_eq!(failure.stage, Stage::Tokenize);
        assert!(matches!(failure.source, PipelineError::NoTransactionsFound { discarded: 1 }));
    }

    #[test]
    fn blank_document_is_an_extract_failure() {
        let p = pipeline(MockPdfBackend::new(vec![MockPage::text("   "), MockPage::default()]));
        let failure = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap_err();
        assert_eq!(failure.stage, Stage::Extract);
    }

    #[test]
    fn strict_mode_fails_on_balance_mismatch() {
        let text = "\
AB12CD34 2024-01-05 10:30:00 Received from JOHN DOE Completed 1,000.00 5,000.00
QX99ZZ11 2024-01-05 14:02:00 Customer Transfer Completed -1,500.00 3,000.00
";
        let mut config = PipelineConfig::default();
        config.reconcile.mode = ReconcileMode::Strict;
        let p = Pipeline::new(MockPdfBackend::new(vec![MockPage::text(text)]), UnavailableRecognizer, config);
        let failure = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap_err();
        assert_eq!(failure.stage, Stage::Reconcile);

        // Warn mode keeps the ledger and flags the row.
        let p = pipeline(MockPdfBackend::new(vec![MockPage::text(text)]));
        let report = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap();
        assert_eq!(report.ledger.flagged().count(), 1);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let p = pipeline(MockPdfBackend::new(vec![MockPage::text(STATEMENT)]));
        let first = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap();
        let second = p.process(&statement_doc(), &PasswordCorpus::default()).unwrap();
        assert_eq!(first.ledger, second.ledger);
        assert_eq!(first.warnings, second.warnings);
    }

    fn statement_cells() -> Vec<Vec<&'static str>> {
        vec![
            vec!["Receipt No.", "Completion Time", "Details", "Transaction Status", "Paid In", "Withdrawn", "Balance"],
            vec!["AB12CD34", "2024-01-05 10:30:00", "Received from JOHN DOE", "Completed", "1,000.00", "5,000.00"],
            vec!["Pay Bill Charge", "Completed", "30.00", "4,970.00"],
        ]
    }

    #[test]
    fn lopdf_text_statement_becomes_a_ledger() {
        for layout in [CellLayout::SeparateBlocks, CellLayout::SingleBlock] {
            let bytes = fixture::document(vec![FixturePage::table(&statement_cells(), layout)]).unwrap();
            let p = Pipeline::new(LopdfBackend, UnavailableRecognizer, PipelineConfig::default());
            let doc = Document::named("MPESA_Statement_2024.pdf", bytes);
            let report = p.process(&doc, &PasswordCorpus::default()).unwrap();
            let txs = &report.ledger.transactions;

            assert_eq!(txs.len(), 2, "{layout:?}");
            assert_eq!(txs[0].receipt_id, "AB12CD34");
            assert_eq!(txs[0].category, Category::Income);
            assert_eq!(txs[0].amount, Money::from_cents(100_000));
            assert_eq!(txs[0].balance, Some(Money::from_cents(500_000)));
            assert_eq!(txs[1].category, Category::Charge);
            assert_eq!(txs[1].amount, Money::from_cents(3_000));
            assert_eq!(txs[1].parent_receipt.as_deref(), Some("AB12CD34"));
            assert_eq!(report.ocr_pages, 0);
            assert_eq!(report.password_source, PasswordSource::NoPassword);
        }
    }

    #[test]
    fn lopdf_scanned_statement_goes_through_ocr() {
        let bytes = fixture::document(vec![FixturePage::scanned(ScanImage {
            width: 40,
            height: 20,
            color_space: "DeviceGray",
            filters: vec![],
            decode_parms: None,
            data: scan().into_luma8().into_raw(),
        })])
        .unwrap();
        let p = Pipeline::new(LopdfBackend, MockRecognizer::new(STATEMENT), PipelineConfig::default());
        let doc = Document::named("MPESA_Statement_2024.pdf", bytes);
        let report = p.process(&doc, &PasswordCorpus::default()).unwrap();

        assert_eq!(report.pages, 1);
        assert_eq!(report.ocr_pages, 1);
        assert_eq!(report.ledger.len(), 4);
    }
}
