//! Fake collaborators and a test harness
//!
//! Every fake counts its invocations in a shared [`Calls`] table so tests
//! can prove that a replay never reaches a collaborator twice.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use montage_core::domain::RecordStatus;
use montage_core::domain::image::{ImageGeneration, ImageParams};
use montage_core::domain::instance::{InstanceStatus, JobInstance};
use montage_core::domain::schedule::Schedule;
use montage_core::domain::user::User;
use montage_core::domain::video::{CaptionWord, RenderStatus, Video, VideoAssets};

use crate::collaborators::*;
use crate::config::EngineConfig;
use crate::definitions::Pipelines;
use crate::dispatcher::Dispatcher;
use crate::error::StepError;
use crate::ledger::StepLedger;
use crate::memory::InMemoryStore;
use crate::repository::InstanceRepository;
use crate::scheduler::ManualClock;

#[derive(Default)]
pub struct Calls {
    counts: Mutex<HashMap<&'static str, u32>>,
}

impl Calls {
    pub fn hit(&self, name: &'static str) -> u32 {
        let mut counts = self.counts.lock();
        let count = counts.entry(name).or_default();
        *count += 1;
        *count
    }

    pub fn count(&self, name: &str) -> u32 {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.lock().values().sum()
    }
}

fn not_found(kind: &str, id: &str) -> StepError {
    StepError::terminal(format!("{kind} {id} not found"))
}

#[derive(Default)]
pub struct FakeStore {
    calls: Arc<Calls>,
    pub videos: Mutex<HashMap<String, Video>>,
    pub images: Mutex<HashMap<String, ImageGeneration>>,
    pub schedules: Mutex<HashMap<String, Schedule>>,
    pub users: Mutex<HashMap<String, User>>,
    /// Every datetime a schedule was re-armed to
    pub rearmed: Mutex<Vec<DateTime<Utc>>>,
    /// Every render status written, in order
    pub render_history: Mutex<Vec<RenderStatus>>,
}

impl FakeStore {
    pub fn video(&self, id: &str) -> Option<Video> {
        self.videos.lock().get(id).cloned()
    }

    pub fn image(&self, id: &str) -> Option<ImageGeneration> {
        self.images.lock().get(id).cloned()
    }

    pub fn schedule(&self, id: &str) -> Option<Schedule> {
        self.schedules.lock().get(id).cloned()
    }
}

#[async_trait]
impl DomainStore for FakeStore {
    async fn get_video(&self, video_id: &str) -> Result<Option<Video>, StepError> {
        self.calls.hit("store.get_video");
        Ok(self.video(video_id))
    }

    async fn update_video_status(
        &self,
        video_id: &str,
        status: RecordStatus,
    ) -> Result<(), StepError> {
        self.calls.hit("store.update_video_status");
        let mut videos = self.videos.lock();
        let video = videos
            .get_mut(video_id)
            .ok_or_else(|| not_found("video", video_id))?;
        video.status = status;
        Ok(())
    }

    async fn save_video_assets(
        &self,
        video_id: &str,
        assets: &VideoAssets,
    ) -> Result<(), StepError> {
        self.calls.hit("store.save_video_assets");
        let mut videos = self.videos.lock();
        let video = videos
            .get_mut(video_id)
            .ok_or_else(|| not_found("video", video_id))?;
        video.audio_url = Some(assets.audio_url.clone());
        video.captions = Some(assets.captions.clone());
        video.images = Some(assets.images.clone());
        video.title = Some(assets.title.clone());
        video.status = assets.status;
        Ok(())
    }

    async fn update_render_status(
        &self,
        video_id: &str,
        rendering: RenderStatus,
    ) -> Result<(), StepError> {
        self.calls.hit("store.update_render_status");
        self.render_history.lock().push(rendering);
        let mut videos = self.videos.lock();
        let video = videos
            .get_mut(video_id)
            .ok_or_else(|| not_found("video", video_id))?;
        video.rendering = rendering;
        Ok(())
    }

    async fn save_video_url(&self, video_id: &str, video_url: &str) -> Result<(), StepError> {
        self.calls.hit("store.save_video_url");
        let mut videos = self.videos.lock();
        let video = videos
            .get_mut(video_id)
            .ok_or_else(|| not_found("video", video_id))?;
        video.video_url = Some(video_url.to_string());
        Ok(())
    }

    async fn get_image_generation(
        &self,
        image_id: &str,
    ) -> Result<Option<ImageGeneration>, StepError> {
        self.calls.hit("store.get_image_generation");
        Ok(self.image(image_id))
    }

    async fn update_image_generation(
        &self,
        image_id: &str,
        status: RecordStatus,
        image: Option<&str>,
    ) -> Result<(), StepError> {
        self.calls.hit("store.update_image_generation");
        let mut images = self.images.lock();
        let record = images
            .get_mut(image_id)
            .ok_or_else(|| not_found("image generation", image_id))?;
        record.status = status;
        record.image = image.map(str::to_string);
        Ok(())
    }

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>, StepError> {
        self.calls.hit("store.get_schedule");
        Ok(self.schedule(schedule_id))
    }

    async fn update_schedule_status(
        &self,
        schedule_id: &str,
        status: RecordStatus,
    ) -> Result<(), StepError> {
        self.calls.hit("store.update_schedule_status");
        let mut schedules = self.schedules.lock();
        let schedule = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| not_found("schedule", schedule_id))?;
        schedule.status = status;
        Ok(())
    }

    async fn rearm_schedule(
        &self,
        schedule_id: &str,
        datetime: DateTime<Utc>,
    ) -> Result<(), StepError> {
        self.calls.hit("store.rearm_schedule");
        let mut schedules = self.schedules.lock();
        let schedule = schedules
            .get_mut(schedule_id)
            .ok_or_else(|| not_found("schedule", schedule_id))?;
        schedule.datetime = datetime;
        schedule.status = RecordStatus::Queued;
        self.rearmed.lock().push(datetime);
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StepError> {
        self.calls.hit("store.get_user");
        Ok(self.users.lock().get(user_id).cloned())
    }

    async fn delete_video(&self, video_id: &str) -> Result<(), StepError> {
        self.calls.hit("store.delete_video");
        self.videos.lock().remove(video_id);
        Ok(())
    }

    async fn delete_image_generation(&self, image_id: &str) -> Result<(), StepError> {
        self.calls.hit("store.delete_image_generation");
        self.images.lock().remove(image_id);
        Ok(())
    }

    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), StepError> {
        self.calls.hit("store.delete_schedule");
        self.schedules.lock().remove(schedule_id);
        Ok(())
    }
}

pub struct FakeText {
    calls: Arc<Calls>,
}

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate(&self, prompt: &str) -> Result<String, StepError> {
        self.calls.hit("text.generate");
        if prompt.contains("image prompts") {
            let scenes: Vec<_> = (0..4)
                .map(|i| {
                    serde_json::json!({
                        "imagePrompt": format!("scene {i} in soft light"),
                        "sceneContent": format!("part {i}"),
                    })
                })
                .collect();
            Ok(format!("```json\n{}\n```", serde_json::Value::Array(scenes)))
        } else if prompt.contains("one title") {
            Ok("\"The Ocean Secret\"\n".to_string())
        } else if prompt.contains("SEO metadata") {
            Ok(r#"{"title":"Ocean Secrets","description":"What lives below","tags":["ocean","science"]}"#
                .to_string())
        } else {
            Err(StepError::terminal("unexpected prompt"))
        }
    }
}

pub struct FakeVoice {
    calls: Arc<Calls>,
}

#[async_trait]
impl VoiceSynthesizer for FakeVoice {
    async fn speak(&self, _text: &str, _voice: &str) -> Result<Vec<u8>, StepError> {
        self.calls.hit("voice.speak");
        Ok(vec![0x52, 0x49, 0x46, 0x46])
    }
}

pub struct FakeTranscriber {
    calls: Arc<Calls>,
    pub empty: AtomicBool,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio_url: &str) -> Result<Vec<CaptionWord>, StepError> {
        self.calls.hit("transcriber.transcribe");
        if self.empty.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(["deep", "ocean", "secrets"]
            .iter()
            .enumerate()
            .map(|(i, w)| CaptionWord {
                word: w.to_string(),
                start: i as f64 * 0.5,
                end: i as f64 * 0.5 + 0.4,
            })
            .collect())
    }
}

pub struct FakeImages {
    calls: Arc<Calls>,
    /// Calls wait for [`FakeImages::release`] while set
    pub hold: AtomicBool,
    released: Notify,
    /// Transient failures to return before succeeding
    pub fail_next: AtomicU32,
    pub last_params: Mutex<Option<(ImageParams, Option<String>)>>,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(
        &self,
        params: &ImageParams,
        reference_image: Option<&str>,
    ) -> Result<Vec<u8>, StepError> {
        self.calls.hit("images.generate");
        if self.hold.load(Ordering::SeqCst) {
            self.released.notified().await;
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StepError::transient("503 service unavailable"));
        }
        *self.last_params.lock() = Some((params.clone(), reference_image.map(str::to_string)));
        Ok(vec![0x89, 0x50, 0x4e, 0x47])
    }
}

impl FakeImages {
    /// Lets every held call continue
    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.released.notify_waiters();
    }
}

pub struct FakeStorage {
    calls: Arc<Calls>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(&self, _bytes: Vec<u8>, file_name: &str) -> Result<String, StepError> {
        self.calls.hit("storage.upload");
        Ok(format!("https://cdn.test/{file_name}"))
    }
}

pub struct FakeRenderFarm {
    calls: Arc<Calls>,
    /// Polls answered with Pending before `result` is returned
    pub pending_polls: AtomicU32,
    pub result: Mutex<RenderProgress>,
}

#[async_trait]
impl RenderFarm for FakeRenderFarm {
    async fn submit(&self, _request: &RenderRequest) -> Result<String, StepError> {
        let n = self.calls.hit("render.submit");
        Ok(format!("render-{n}"))
    }

    async fn poll(&self, _render_id: &str) -> Result<RenderProgress, StepError> {
        let n = self.calls.hit("render.poll");
        if n <= self.pending_polls.load(Ordering::SeqCst) {
            return Ok(RenderProgress::Pending);
        }
        Ok(self.result.lock().clone())
    }
}

pub struct FakePublisher {
    calls: Arc<Calls>,
}

#[async_trait]
impl PublishingPlatform for FakePublisher {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, StepError> {
        self.calls.hit("publisher.refresh_access_token");
        if refresh_token.is_empty() {
            return Err(StepError::terminal("invalid_grant"));
        }
        Ok(format!("access-for-{refresh_token}"))
    }

    async fn publish(
        &self,
        _access_token: &str,
        _video_url: &str,
        _metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, StepError> {
        let n = self.calls.hit("publisher.publish");
        Ok(PublishReceipt {
            published_id: format!("yt-{n}"),
            channel_title: Some("Deep Channel".to_string()),
        })
    }
}

pub struct FakeNotifier {
    calls: Arc<Calls>,
    pub fail: AtomicBool,
    pub sent: Mutex<Vec<(String, PublishedNotice)>>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_email(&self, to: &str, notice: &PublishedNotice) -> Result<(), StepError> {
        self.calls.hit("notifier.send_email");
        if self.fail.load(Ordering::SeqCst) {
            return Err(StepError::terminal("mailbox rejected"));
        }
        self.sent.lock().push((to.to_string(), notice.clone()));
        Ok(())
    }
}

/// All fakes sharing one call table
pub struct FakeWorld {
    pub calls: Arc<Calls>,
    pub store: Arc<FakeStore>,
    pub transcriber: Arc<FakeTranscriber>,
    pub images: Arc<FakeImages>,
    pub render: Arc<FakeRenderFarm>,
    pub notifier: Arc<FakeNotifier>,
    collaborators: Collaborators,
}

impl FakeWorld {
    pub fn new() -> Self {
        let calls = Arc::new(Calls::default());
        let store = Arc::new(FakeStore {
            calls: Arc::clone(&calls),
            ..Default::default()
        });
        let transcriber = Arc::new(FakeTranscriber {
            calls: Arc::clone(&calls),
            empty: AtomicBool::new(false),
        });
        let images = Arc::new(FakeImages {
            calls: Arc::clone(&calls),
            hold: AtomicBool::new(false),
            released: Notify::new(),
            fail_next: AtomicU32::new(0),
            last_params: Mutex::new(None),
        });
        let render = Arc::new(FakeRenderFarm {
            calls: Arc::clone(&calls),
            pending_polls: AtomicU32::new(2),
            result: Mutex::new(RenderProgress::Done {
                output_url: "https://cdn.test/render.mp4".to_string(),
            }),
        });
        let notifier = Arc::new(FakeNotifier {
            calls: Arc::clone(&calls),
            fail: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        });

        let collaborators = Collaborators {
            store: store.clone(),
            text: Arc::new(FakeText {
                calls: Arc::clone(&calls),
            }),
            voice: Arc::new(FakeVoice {
                calls: Arc::clone(&calls),
            }),
            transcriber: transcriber.clone(),
            images: images.clone(),
            storage: Arc::new(FakeStorage {
                calls: Arc::clone(&calls),
            }),
            render: render.clone(),
            publisher: Arc::new(FakePublisher {
                calls: Arc::clone(&calls),
            }),
            notifier: notifier.clone(),
        };

        Self {
            calls,
            store,
            transcriber,
            images,
            render,
            notifier,
            collaborators,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        self.collaborators.clone()
    }
}

/// Engine settings with millisecond backoff and polling
pub fn test_config() -> EngineConfig {
    EngineConfig {
        step_initial_backoff: Duration::from_millis(1),
        step_max_backoff: Duration::from_millis(2),
        step_timeout: Duration::from_secs(5),
        render_poll_interval: Duration::from_millis(1),
        render_max_polls: 50,
        ..Default::default()
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn sample_video(id: &str) -> Video {
    let script = "The ocean covers most of our planet yet we have explored only a small part of it. "
        .repeat(5);
    Video {
        id: id.to_string(),
        user_id: "u1".to_string(),
        script,
        voice: "aura-asteria-en".to_string(),
        video_style: "cinematic".to_string(),
        title: None,
        audio_url: None,
        captions: None,
        images: None,
        status: RecordStatus::Queued,
        video_url: None,
        rendering: RenderStatus::NotRendered,
    }
}

/// A video whose assets are produced but that has not been rendered
pub fn produced_video(id: &str) -> Video {
    Video {
        title: Some("The Ocean Secret".to_string()),
        audio_url: Some(format!("https://cdn.test/audio-{id}.wav")),
        captions: Some(vec![CaptionWord {
            word: "ocean".to_string(),
            start: 0.0,
            end: 0.4,
        }]),
        images: Some(vec![format!("https://cdn.test/scene-{id}-0.png")]),
        status: RecordStatus::Completed,
        ..sample_video(id)
    }
}

pub fn sample_user() -> User {
    User {
        id: "u1".to_string(),
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
    }
}

/// Engine wired to an in-memory store, a manual clock and the fakes
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub world: FakeWorld,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = InMemoryStore::arc();
        Self::build(config, store.clone(), store)
    }

    /// A harness whose runners write steps through `ledger`
    pub fn with_ledger(ledger: impl FnOnce(Arc<InMemoryStore>) -> Arc<dyn StepLedger>) -> Self {
        let store = InMemoryStore::arc();
        let ledger = ledger(store.clone());
        Self::build(test_config(), store, ledger)
    }

    fn build(config: EngineConfig, store: Arc<InMemoryStore>, ledger: Arc<dyn StepLedger>) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let world = FakeWorld::new();
        let pipelines = Pipelines::standard(world.collaborators(), &config);
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            ledger,
            pipelines,
            clock.clone(),
            &config,
        ));

        Self {
            store,
            clock,
            world,
            dispatcher,
        }
    }

    pub async fn instance(&self, id: Uuid) -> JobInstance {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }

    /// Polls until the instance reaches `status`
    pub async fn wait_for(&self, id: Uuid, status: InstanceStatus) -> JobInstance {
        for _ in 0..2000 {
            let instance = self.instance(id).await;
            if instance.status == status {
                return instance;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("instance {id} never reached {status}");
    }

    /// Polls until `name` has been called at least `count` times
    pub async fn wait_for_calls(&self, name: &str, count: u32) {
        for _ in 0..2000 {
            if self.world.calls.count(name) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("{name} was never called {count} time(s)");
    }

    pub async fn step_names(&self, id: Uuid) -> Vec<String> {
        self.store
            .list_steps(id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect()
    }
}
