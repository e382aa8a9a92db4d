//! Scriptable `ImportServiceOps` fake shared by the import tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::import::api::{ImportServiceOps, UploadFile};
use crate::import::models::ImportDetails;
use crate::import::ImportState;

pub(crate) fn details(import_id: &str, state: ImportState) -> ImportDetails {
    ImportDetails {
        import_id: import_id.into(),
        file_name: "orgs.xlsx".into(),
        import_state: state,
        percentage: 0.0,
        import_result: None,
        validation_result: None,
        last_update_date: None,
        imported_at: None,
    }
}

#[derive(Default)]
struct Script {
    details: VecDeque<Result<ImportDetails, AppError>>,
    lists: VecDeque<Result<Vec<ImportDetails>, AppError>>,
    upload: Option<Result<ImportDetails, AppError>>,
    validation_error: Option<AppError>,
    calls: Vec<String>,
}

/// Each queue pops until one entry is left; a final `Ok` entry is repeated.
#[derive(Clone, Default)]
pub(crate) struct FakeImportService {
    script: Arc<Mutex<Script>>,
    delay: Duration,
}

fn next_scripted<T: Clone>(queue: &mut VecDeque<Result<T, AppError>>) -> Result<T, AppError> {
    if queue.len() > 1 {
        return queue.pop_front().unwrap();
    }
    match queue.front() {
        Some(Ok(value)) => Ok(value.clone()),
        Some(Err(_)) => queue.pop_front().unwrap(),
        None => Err(AppError::Internal("nothing scripted".into())),
    }
}

impl FakeImportService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Delays every call, simulating network latency.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn push_details(&self, result: Result<ImportDetails, AppError>) -> &Self {
        self.script.lock().unwrap().details.push_back(result);
        self
    }

    pub(crate) fn push_list(&self, result: Result<Vec<ImportDetails>, AppError>) -> &Self {
        self.script.lock().unwrap().lists.push_back(result);
        self
    }

    pub(crate) fn set_upload(&self, result: Result<ImportDetails, AppError>) -> &Self {
        self.script.lock().unwrap().upload = Some(result);
        self
    }

    pub(crate) fn fail_validation(&self, error: AppError) -> &Self {
        self.script.lock().unwrap().validation_error = Some(error);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub(crate) fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.script.lock().unwrap().calls.push(call);
    }
}

impl ImportServiceOps for FakeImportService {
    fn list_imports<'a>(
        &'a self,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ImportDetails>, AppError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.record(format!("list:{}", account));
            next_scripted(&mut self.script.lock().unwrap().lists)
        })
    }

    fn get_import_details<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ImportDetails, AppError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.record(format!("details:{}", import_id));
            next_scripted(&mut self.script.lock().unwrap().details)
        })
    }

    fn upload_file(
        &self,
        file: UploadFile,
    ) -> Pin<Box<dyn Future<Output = Result<ImportDetails, AppError>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.record(format!("upload:{}", file.file_name));
            self.script
                .lock()
                .unwrap()
                .upload
                .take()
                .unwrap_or_else(|| Err(AppError::Internal("nothing scripted".into())))
        })
    }

    fn start_validation<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.record(format!("validate:{}", import_id));
            match self.script.lock().unwrap().validation_error.take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        })
    }

    fn start_import<'a>(
        &'a self,
        import_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.record(format!("import:{}", import_id));
            Ok(())
        })
    }
}
