use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use futures::{FutureExt, Stream};
use log::{debug, info, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;
use crate::artifact::TempFile;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{ErrorEvent, PipelineEvent, ProgressEvent, ResultEvent, Stage};
use crate::image_client::{ImageGenerator, RemoteImageClient};
use crate::job::{GenerationJob, GenerationRequest, JobState};
use crate::vectorize::{self, Vectorizer};

/// Runs prompt → raster → SVG jobs, one at a time, on a Tokio task.
pub struct PipelineRunner {
    generator: Arc<dyn ImageGenerator>,
    vectorizer: Arc<dyn Vectorizer>,
    work_dir: PathBuf,
    busy: Arc<AtomicBool>,
}

impl PipelineRunner {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        vectorizer: Arc<dyn Vectorizer>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator,
            vectorizer,
            work_dir: work_dir.into(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let generator = Arc::new(RemoteImageClient::new(config.image.clone())?);
        let vectorizer = vectorize::from_config(&config.vectorize)?;
        Ok(Self::new(generator, vectorizer, config.work_dir.clone()))
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Starts a job for `prompt` and returns its event stream.
    ///
    /// Invalid prompts and calls made while another job is in flight are
    /// rejected here: the handle yields a single `Failed` event and no work
    /// is spawned. Must be called from within a Tokio runtime.
    pub fn run(&self, prompt: impl Into<String>) -> JobHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::default();
        let mut handle = JobHandle {
            job_id: None,
            events: rx,
            cancel: cancel.clone(),
        };

        let request = match GenerationRequest::new(prompt) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx.send(PipelineEvent::Failed(ErrorEvent::from_error(None, &e)));
                return handle;
            }
        };

        if self.busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            let _ = tx.send(PipelineEvent::Failed(ErrorEvent::from_error(None, &Error::RunnerBusy)));
            return handle;
        }
        let busy = BusyGuard(self.busy.clone());

        let job = GenerationJob::new(request, &self.work_dir);
        handle.job_id = Some(job.id);

        let ctx = JobContext {
            generator: self.generator.clone(),
            vectorizer: self.vectorizer.clone(),
            events: tx,
            cancel,
            stage: Mutex::new(None),
        };

        tokio::spawn(async move {
            let fallback = job.clone();
            let (job, terminal) = match AssertUnwindSafe(ctx.execute(job)).catch_unwind().await {
                Ok(done) => done,
                Err(panic) => ctx.recover(fallback, panic),
            };
            // Free the runner before the caller can observe the terminal event
            drop(busy);
            ctx.finish(&job, terminal);
        });

        handle
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cooperative cancellation, observed between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller side of a job: ordered progress events, then exactly one of
/// `Finished`/`Failed`, then end of stream.
pub struct JobHandle {
    job_id: Option<Uuid>,
    events: UnboundedReceiver<PipelineEvent>,
    cancel: CancelToken,
}

impl JobHandle {
    /// `None` when the run was rejected before a job existed
    pub fn job_id(&self) -> Option<Uuid> {
        self.job_id
    }

    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn into_stream(self) -> impl Stream<Item = PipelineEvent> {
        futures::stream::unfold(self, |mut handle| async move {
            handle.recv().await.map(|event| (event, handle))
        })
    }

    /// Drains the stream until the job is over.
    pub async fn collect(self) -> Vec<PipelineEvent> {
        use futures::StreamExt;
        self.into_stream().collect().await
    }
}

struct JobContext {
    generator: Arc<dyn ImageGenerator>,
    vectorizer: Arc<dyn Vectorizer>,
    events: UnboundedSender<PipelineEvent>,
    cancel: CancelToken,
    /// Last stage entered, used to classify a panic
    stage: Mutex<Option<Stage>>,
}

impl JobContext {
    async fn execute(&self, mut job: GenerationJob) -> (GenerationJob, PipelineEvent) {
        info!("Starting job {} for prompt '{}'", job.id, job.request.prompt());

        let raster = TempFile::new(job.raster_path.clone());
        let outcome = self.drive(&mut job).await;
        drop(raster);

        let terminal = match outcome {
            Ok(path) => {
                job.state = JobState::Complete;
                info!("Job {} complete in {}ms: {}", job.id, job.elapsed_ms(), path.display());
                PipelineEvent::Finished(ResultEvent { job_id: job.id, path })
            }
            Err(e) => {
                remove_if_present(&job.vector_path);
                job.state = match e {
                    Error::Cancelled => JobState::Cancelled,
                    _ => JobState::Failed,
                };
                warn!("Job {} failed after {}ms: {}", job.id, job.elapsed_ms(), e);
                PipelineEvent::Failed(ErrorEvent::from_error(Some(job.id), &e))
            }
        };

        (job, terminal)
    }

    async fn drive(&self, job: &mut GenerationJob) -> Result<PathBuf> {
        if let Some(dir) = job.raster_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| Error::io(dir, e))?;
        }

        self.enter(job, Stage::Generating)?;
        let bytes = self.generator.generate(job.request.prompt()).await?;
        tokio::fs::write(&job.raster_path, &bytes)
            .await
            .map_err(|e| Error::io(&job.raster_path, e))?;
        debug!("Job {} wrote {} raster bytes", job.id, bytes.len());

        self.enter(job, Stage::Vectorizing)?;
        let svg = self.vectorizer.vectorize(&job.raster_path).await?;
        tokio::fs::write(&job.vector_path, svg.as_bytes())
            .await
            .map_err(|e| Error::io(&job.vector_path, e))?;

        self.enter(job, Stage::Finalizing)?;
        Ok(job.vector_path.clone())
    }

    fn enter(&self, job: &mut GenerationJob, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        job.state = JobState::from(stage);
        *self.stage.lock().unwrap_or_else(|e| e.into_inner()) = Some(stage);
        self.emit(PipelineEvent::Progress(ProgressEvent {
            job_id: job.id,
            stage,
            message: stage.message().to_string(),
        }));
        Ok(())
    }

    /// Turns a panic inside a generator or vectorizer into a `Failed` event.
    /// The raster guard has already run during unwinding.
    fn recover(&self, mut job: GenerationJob, panic: Box<dyn Any + Send>) -> (GenerationJob, PipelineEvent) {
        let detail = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());

        let stage = *self.stage.lock().unwrap_or_else(|e| e.into_inner());
        let error = match stage {
            Some(Stage::Generating) | None => Error::upstream(None, format!("Image generation panicked: {detail}")),
            Some(_) => Error::Conversion(format!("Vectorization panicked: {detail}")),
        };

        remove_if_present(&job.raster_path);
        remove_if_present(&job.vector_path);
        job.state = JobState::Failed;
        warn!("Job {} panicked: {}", job.id, error);

        let terminal = PipelineEvent::Failed(ErrorEvent::from_error(Some(job.id), &error));
        (job, terminal)
    }

    fn emit(&self, event: PipelineEvent) -> bool {
        self.events.send(event).is_ok()
    }

    fn finish(&self, job: &GenerationJob, terminal: PipelineEvent) {
        let delivered = self.emit(terminal);
        if !delivered && job.state == JobState::Complete {
            // Nobody is left to claim the result
            warn!("Job {} result was not received, removing {}", job.id, job.vector_path.display());
            remove_if_present(&job.vector_path);
        }
    }
}

fn remove_if_present(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use tokio::sync::Notify;
    use super::*;
    use crate::error::ErrorKind;

    fn png_bytes() -> Vec<u8> {
        let img = RgbaImage::from_pixel(8, 8, Rgba([20, 40, 60, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[derive(Default)]
    struct MockGenerator {
        calls: AtomicUsize,
        fail_status: Option<u16>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ImageGenerator for MockGenerator {
        async fn generate(&self, _prompt: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.fail_status {
                Some(status) => Err(Error::upstream(Some(status), "Internal Server Error")),
                None => Ok(png_bytes()),
            }
        }
    }

    #[derive(Default)]
    struct MockVectorizer {
        calls: AtomicUsize,
        saw_input: AtomicBool,
        unavailable: bool,
        panics: bool,
    }

    #[async_trait]
    impl Vectorizer for MockVectorizer {
        async fn vectorize(&self, raster: &Path) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.saw_input.store(raster.exists(), Ordering::SeqCst);
            if self.unavailable {
                return Err(Error::ToolUnavailable("potrace".into()));
            }
            if self.panics {
                panic!("tracer crashed");
            }
            Ok("<svg xmlns=\"http://www.w3.org/2000/svg\"><path d=\"M0 0h8v8H0z\"/></svg>".into())
        }
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect()
    }

    fn stages(events: &[PipelineEvent]) -> Vec<Stage> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress(p) => Some(p.stage),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_successful_run_event_order() {
        let dir = tempfile::tempdir().unwrap();
        let vectorizer = Arc::new(MockVectorizer::default());
        let runner = PipelineRunner::new(Arc::new(MockGenerator::default()), vectorizer.clone(), dir.path());

        let handle = runner.run("A vibrant logo for a tech startup called 'SynthWave'");
        let job_id = handle.job_id().unwrap();
        let events = handle.collect().await;

        assert_eq!(events.len(), 4);
        assert_eq!(stages(&events), vec![Stage::Generating, Stage::Vectorizing, Stage::Finalizing]);

        let PipelineEvent::Finished(result) = &events[3] else {
            panic!("expected Finished, got {:?}", events[3]);
        };
        assert_eq!(result.job_id, job_id);
        assert!(std::fs::metadata(&result.path).unwrap().len() > 0);
        assert!(vectorizer.saw_input.load(Ordering::SeqCst));

        // Only the handed-off SVG is left behind
        assert_eq!(files_in(dir.path()), vec![result.path.clone()]);
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_empty_prompt_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(MockGenerator::default());
        let runner = PipelineRunner::new(generator.clone(), Arc::new(MockVectorizer::default()), dir.path());

        let handle = runner.run("");
        assert!(handle.job_id().is_none());
        let events = handle.collect().await;

        assert_eq!(events.len(), 1);
        let PipelineEvent::Failed(err) = &events[0] else { panic!("expected Failed") };
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_creates_no_vector() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(MockGenerator { fail_status: Some(500), ..Default::default() });
        let vectorizer = Arc::new(MockVectorizer::default());
        let runner = PipelineRunner::new(generator, vectorizer.clone(), dir.path());

        let events = runner.run("a fox").collect().await;

        assert_eq!(stages(&events), vec![Stage::Generating]);
        let PipelineEvent::Failed(err) = events.last().unwrap() else { panic!("expected Failed") };
        assert_eq!(err.kind, ErrorKind::UpstreamError);
        assert!(err.message.contains("500"));
        assert_eq!(vectorizer.calls.load(Ordering::SeqCst), 0);
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_vectorizer_failure_still_removes_raster() {
        let dir = tempfile::tempdir().unwrap();
        let vectorizer = Arc::new(MockVectorizer { unavailable: true, ..Default::default() });
        let runner = PipelineRunner::new(Arc::new(MockGenerator::default()), vectorizer.clone(), dir.path());

        let events = runner.run("a fox").collect().await;

        assert_eq!(stages(&events), vec![Stage::Generating, Stage::Vectorizing]);
        let PipelineEvent::Failed(err) = events.last().unwrap() else { panic!("expected Failed") };
        assert_eq!(err.kind, ErrorKind::ToolUnavailable);
        assert!(vectorizer.saw_input.load(Ordering::SeqCst));
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_vectorizer_panic_still_ends_with_failure() {
        let dir = tempfile::tempdir().unwrap();
        let vectorizer = Arc::new(MockVectorizer { panics: true, ..Default::default() });
        let runner = PipelineRunner::new(Arc::new(MockGenerator::default()), vectorizer, dir.path());

        let events = runner.run("a fox").collect().await;

        assert_eq!(stages(&events), vec![Stage::Generating, Stage::Vectorizing]);
        let PipelineEvent::Failed(err) = events.last().unwrap() else {
            panic!("expected Failed, got {:?}", events.last());
        };
        assert_eq!(err.kind, ErrorKind::ConversionError);
        assert!(err.message.contains("tracer crashed"));
        assert!(files_in(dir.path()).is_empty());
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_generator_panic_is_upstream_failure() {
        struct Exploding;

        #[async_trait]
        impl ImageGenerator for Exploding {
            async fn generate(&self, _prompt: &str) -> Result<Vec<u8>> {
                panic!("{}", String::from("client bug"));
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(Arc::new(Exploding), Arc::new(MockVectorizer::default()), dir.path());

        let events = runner.run("a fox").collect().await;

        let PipelineEvent::Failed(err) = events.last().unwrap() else {
            panic!("expected Failed, got {:?}", events.last());
        };
        assert_eq!(err.kind, ErrorKind::UpstreamError);
        assert!(err.message.contains("client bug"));
        assert!(files_in(dir.path()).is_empty());

        // The runner is usable again afterwards
        assert!(runner.run("again").job_id().is_some());
    }

    #[tokio::test]
    async fn test_sequential_jobs_use_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(
            Arc::new(MockGenerator::default()),
            Arc::new(MockVectorizer::default()),
            dir.path(),
        );

        let mut paths = Vec::new();
        for _ in 0..2 {
            let events = runner.run("same prompt").collect().await;
            match events.last() {
                Some(PipelineEvent::Finished(result)) => paths.push(result.path.clone()),
                other => panic!("expected Finished, got {:?}", other),
            }
        }

        assert_ne!(paths[0], paths[1]);
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[tokio::test]
    async fn test_second_run_while_busy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let generator = Arc::new(MockGenerator { gate: Some(gate.clone()), ..Default::default() });
        let runner = PipelineRunner::new(generator.clone(), Arc::new(MockVectorizer::default()), dir.path());

        let mut first = runner.run("first");
        assert!(matches!(first.recv().await, Some(PipelineEvent::Progress(_))));
        assert!(runner.is_busy());

        let events = runner.run("second").collect().await;
        assert_eq!(events.len(), 1);
        let PipelineEvent::Failed(err) = &events[0] else { panic!("expected Failed") };
        assert_eq!(err.kind, ErrorKind::RunnerBusy);

        gate.notify_one();
        let rest = first.collect().await;
        assert!(matches!(rest.last(), Some(PipelineEvent::Finished(_))));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        // Free again as soon as the terminal event is out
        let mut third = runner.run("third");
        assert!(third.job_id().is_some());
        gate.notify_one();
        while third.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_cancel_between_stages() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let generator = Arc::new(MockGenerator { gate: Some(gate.clone()), ..Default::default() });
        let vectorizer = Arc::new(MockVectorizer::default());
        let runner = PipelineRunner::new(generator, vectorizer.clone(), dir.path());

        let handle = runner.run("a fox");
        handle.cancel();
        gate.notify_one();
        let events = handle.collect().await;

        let PipelineEvent::Failed(err) = events.last().unwrap() else { panic!("expected Failed") };
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(vectorizer.calls.load(Ordering::SeqCst), 0);
        assert!(files_in(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_handle_discards_result() {
        let dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(
            Arc::new(MockGenerator::default()),
            Arc::new(MockVectorizer::default()),
            dir.path(),
        );

        let handle = runner.run("nobody is listening");
        assert!(runner.is_busy());
        drop(handle);

        for _ in 0..200 {
            if !runner.is_busy() && files_in(dir.path()).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!runner.is_busy());
        assert!(files_in(dir.path()).is_empty());
    }
}
