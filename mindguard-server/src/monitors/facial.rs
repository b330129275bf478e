//! Camera facial-affect monitor
//!
//! Classifies one camera frame per interval with lenient detection. The
//! displayed label goes through this monitor's own stability tracker and the
//! stored score is the stress tier of that same label.

use crate::camera::CameraSource;
use crate::classifier::{ClassifierError, Detection, FacialClassifier};
use crate::error::Result;
use crate::scoring::StressTiers;
use crate::state::SharedState;
use crate::tracker::EmotionStabilityTracker;
use mindguard_common::{Emotion, SourceStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct FacialAffectMonitor {
    state: Arc<SharedState>,
    classifier: Arc<dyn FacialClassifier>,
    tiers: StressTiers,
    interval: Duration,
    tracker: EmotionStabilityTracker,
}

impl FacialAffectMonitor {
    pub fn new(
        state: Arc<SharedState>,
        classifier: Arc<dyn FacialClassifier>,
        tiers: StressTiers,
        interval: Duration,
    ) -> Self {
        Self {
            state,
            classifier,
            tiers,
            interval,
            tracker: EmotionStabilityTracker::new(),
        }
    }

    /// Classify one frame and store the result
    ///
    /// A frame without a face leaves the state untouched.
    pub async fn run_cycle(&mut self, camera: &mut dyn CameraSource) -> Result<()> {
        let frame = camera.capture().await?;

        let analysis = match self.classifier.analyze(&frame, Detection::Lenient).await {
            Ok(analysis) => analysis,
            Err(ClassifierError::NoFace) => {
                debug!("No face in camera frame");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if Emotion::from_label(&analysis.dominant).is_none() {
            let score = self.tiers.score_for(None);
            debug!("Unrecognised label '{}', tier {}", analysis.dominant, score);
            self.state.set_facial_score(score).await;
            return Ok(());
        }

        let (label, confidence) = self.tracker.stable_label(&analysis.emotions);
        let score = self.tiers.score_for(Some(label));
        debug!("Camera emotion {} ({:.1}%), tier {}", label, confidence, score);
        self.state.set_facial_emotion(label).await;
        self.state.set_facial_score(score).await;

        Ok(())
    }

    /// Sample the camera until shutdown
    ///
    /// `camera` is the result of opening the capture source; a failed open
    /// marks the camera as errored and returns immediately.
    pub async fn run(mut self, camera: Result<Box<dyn CameraSource>>, shutdown: CancellationToken) {
        let mut camera = match camera {
            Ok(camera) => camera,
            Err(e) => {
                error!("Camera unavailable: {}", e);
                self.state.set_camera_status(SourceStatus::Error).await;
                return;
            }
        };

        self.state.set_camera_status(SourceStatus::Active).await;
        info!("Camera monitor active");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Transient failures only cost this frame
            if let Err(e) = self.run_cycle(camera.as_mut()).await {
                warn!("Camera frame skipped: {}", e);
            }
        }

        info!("Camera monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FacialAnalysis;
    use crate::error::Error;
    use async_trait::async_trait;
    use image::DynamicImage;
    use mindguard_common::EmotionSample;
    use std::sync::Mutex;

    struct StillCamera;

    #[async_trait]
    impl CameraSource for StillCamera {
        async fn capture(&mut self) -> Result<DynamicImage> {
            Ok(DynamicImage::new_rgb8(4, 4))
        }
    }

    /// Replays scripted responses, then reports no face
    struct ScriptedClassifier {
        responses: Mutex<Vec<std::result::Result<FacialAnalysis, ClassifierError>>>,
    }

    impl ScriptedClassifier {
        fn new(mut responses: Vec<std::result::Result<FacialAnalysis, ClassifierError>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl FacialClassifier for ScriptedClassifier {
        async fn analyze(
            &self,
            _frame: &DynamicImage,
            detection: Detection,
        ) -> std::result::Result<FacialAnalysis, ClassifierError> {
            assert_eq!(detection, Detection::Lenient);
            self.responses.lock().unwrap().pop().unwrap_or(Err(ClassifierError::NoFace))
        }
    }

    fn analysis(dominant: &str, probs: &[(&str, f64)]) -> std::result::Result<FacialAnalysis, ClassifierError> {
        Ok(FacialAnalysis {
            emotions: EmotionSample::from_labels(probs.iter().copied()).unwrap(),
            dominant: dominant.to_string(),
        })
    }

    fn monitor(state: &Arc<SharedState>, classifier: Arc<ScriptedClassifier>) -> FacialAffectMonitor {
        FacialAffectMonitor::new(
            Arc::clone(state),
            classifier,
            StressTiers::default(),
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_cycle_stores_tier_and_stable_label() {
        let state = Arc::new(SharedState::new());
        let classifier = ScriptedClassifier::new(vec![analysis("fear", &[("fear", 70.0), ("neutral", 30.0)])]);
        let mut monitor = monitor(&state, classifier);

        monitor.run_cycle(&mut StillCamera).await.unwrap();
        assert_eq!(state.facial_score().await, 12.0);
        assert_eq!(state.facial_emotion().await, Emotion::Fear);
    }

    #[tokio::test]
    async fn test_low_confidence_scores_the_kept_label() {
        let state = Arc::new(SharedState::new());
        let classifier = ScriptedClassifier::new(vec![
            analysis("fear", &[("fear", 80.0), ("neutral", 20.0)]),
            analysis("sad", &[("sad", 20.0), ("neutral", 19.0), ("happy", 18.0)]),
        ]);
        let mut monitor = monitor(&state, classifier);

        monitor.run_cycle(&mut StillCamera).await.unwrap();
        assert_eq!(state.facial_emotion().await, Emotion::Fear);
        assert_eq!(state.facial_score().await, 12.0);

        // 20% sad is below the low band, so Fear is kept and scored as Fear
        monitor.run_cycle(&mut StillCamera).await.unwrap();
        assert_eq!(state.facial_emotion().await, Emotion::Fear);
        assert_eq!(state.facial_score().await, 12.0);
    }

    #[tokio::test]
    async fn test_unknown_label_scores_other_tier() {
        let state = Arc::new(SharedState::new());
        state.set_facial_emotion(Emotion::Happy).await;
        let classifier = ScriptedClassifier::new(vec![analysis("contempt", &[("happy", 90.0)])]);
        let mut monitor = monitor(&state, classifier);

        monitor.run_cycle(&mut StillCamera).await.unwrap();
        assert_eq!(state.facial_score().await, 4.0);
        assert_eq!(state.facial_emotion().await, Emotion::Happy);
    }

    #[tokio::test]
    async fn test_no_face_leaves_state_untouched() {
        let state = Arc::new(SharedState::new());
        let mut monitor = monitor(&state, ScriptedClassifier::new(vec![]));

        monitor.run_cycle(&mut StillCamera).await.unwrap();
        assert_eq!(state.facial_score().await, 2.0);
        assert_eq!(state.facial_emotion().await, Emotion::Neutral);
    }

    #[tokio::test]
    async fn test_failed_open_sets_error_status() {
        let state = Arc::new(SharedState::new());
        let monitor = monitor(&state, ScriptedClassifier::new(vec![]));

        monitor
            .run(
                Err(Error::DeviceUnavailable("no camera".to_string())),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(state.camera_status().await, SourceStatus::Error);
    }

    #[tokio::test]
    async fn test_run_goes_active_and_stops_on_shutdown() {
        let state = Arc::new(SharedState::new());
        let classifier = ScriptedClassifier::new(vec![analysis("happy", &[("happy", 95.0)])]);
        let monitor = monitor(&state, classifier);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(monitor.run(Ok(Box::new(StillCamera)), shutdown.clone()));

        tokio::time::timeout(Duration::from_secs(2), async {
            while state.facial_emotion().await != Emotion::Happy {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(state.camera_status().await, SourceStatus::Active);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
