use action_locator::*;
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use perceiver_visual::{
    ImageprocMatcher, MemoryTemplateStore, TemplateMatcher, TextBlock, TextDetector, VisualError,
};
use serde_json::json;
use soulheal_core_types::{AreaOfInterest, LocateValue, PixelRect, Point, Target};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;

/// Scriptable automation backend
#[derive(Default)]
struct FakeDriver {
    caps: SourceCapabilities,
    frame: Option<DynamicImage>,
    elements: HashMap<String, Vec<Point>>,
    broken: bool,
    captures: AtomicUsize,
    lookups: AtomicUsize,
}

impl FakeDriver {
    fn with_element(mut self, raw: &str, points: &[Point]) -> Self {
        self.elements.insert(raw.to_string(), points.to_vec());
        self
    }
}

#[async_trait]
impl ElementSource for FakeDriver {
    fn name(&self) -> &str {
        "fake-driver"
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.caps
    }

    async fn capture(&self) -> Result<DynamicImage, SourceError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.frame
            .clone()
            .ok_or_else(|| SourceError::Backend("display disconnected".into()))
    }

    async fn locate(&self, target: &Target, index: usize) -> Result<Option<LocateValue>, SourceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(SourceError::Backend("session lost".into()));
        }
        Ok(self
            .elements
            .get(target.raw())
            .and_then(|points| points.get(index))
            .map(|p| LocateValue::Coordinates(*p)))
    }
}

struct FixedText(Vec<TextBlock>);

#[async_trait]
impl TextDetector for FixedText {
    fn name(&self) -> &str {
        "fixed-text"
    }

    async fn detect_text(&self, _image: &DynamicImage) -> Result<Vec<TextBlock>, VisualError> {
        Ok(self.0.clone())
    }
}

fn word(text: &str, x: u32, y: u32) -> TextBlock {
    TextBlock {
        text: text.to_string(),
        confidence: 0.93,
        bounds: PixelRect::new(x, y, 30, 10),
    }
}

fn noise(width: u32, height: u32) -> GrayImage {
    let mut state: u32 = 0x1234_5678;
    ImageBuffer::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        Luma([(state >> 24) as u8 | 0x08])
    })
}

fn text_caps() -> SourceCapabilities {
    SourceCapabilities {
        capture: true,
        text_lookup: true,
        ..Default::default()
    }
}

fn manager_with(backends: SessionBackends) -> (Arc<StrategyManager>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let tracer = ExecutionTracer::new().with_sink(sink.clone());
    (Arc::new(StrategyManager::new(backends, tracer)), sink)
}

fn outcomes(attempts: &[Attempt]) -> Vec<(Technique, &'static str)> {
    attempts
        .iter()
        .map(|a| (a.technique, a.outcome.label()))
        .collect()
}

#[tokio::test]
async fn structural_target_uses_only_the_structural_locator() {
    let driver = Arc::new(
        FakeDriver {
            caps: SourceCapabilities {
                structural_lookup: true,
                ..Default::default()
            },
            ..Default::default()
        }
        .with_element("//button[@id='ok']", &[Point::new(40, 12)]),
    );
    let (manager, sink) = manager_with(SessionBackends::from_source(driver.clone()));
    let healer = SelfHealer::new(manager);

    let located = healer
        .locate(ResolveRequest::new("//button[@id='ok']").unwrap())
        .await
        .unwrap();
    assert_eq!(located.technique, Technique::StructuralLocator);
    assert_eq!(located.value, LocateValue::Coordinates(Point::new(40, 12)));
    assert_eq!(driver.captures.load(Ordering::SeqCst), 0);
    assert_eq!(
        outcomes(&sink.attempts()),
        vec![(Technique::StructuralLocator, "success")]
    );
}

#[tokio::test]
async fn direct_text_skipped_then_ocr_succeeds() {
    let source = StaticFrameSource::new(DynamicImage::new_rgb8(200, 100));
    let detector: Arc<dyn TextDetector> = Arc::new(FixedText(vec![word("Login", 20, 30)]));
    let backends = SessionBackends::new(FallbackGroup::single("screen", Arc::new(source) as Arc<dyn ElementSource>))
        .with_text_detectors(FallbackGroup::single("ocr", detector));
    let (manager, _) = manager_with(backends);

    let mut stream = manager
        .resolve(ResolveRequest::new("Login").unwrap())
        .await
        .unwrap();
    let first = stream.next().await.unwrap();
    assert_eq!(first.technique, Technique::OcrText);
    assert_eq!(first.value, LocateValue::Coordinates(Point::new(35, 35)));
    assert!(stream.next().await.is_none());
    assert_eq!(
        outcomes(stream.attempts()),
        vec![
            (Technique::DirectText, "skipped"),
            (Technique::OcrText, "success"),
        ]
    );
}

#[tokio::test]
async fn kth_candidate_is_used_after_k_minus_one_action_failures() {
    let driver = Arc::new(
        FakeDriver {
            caps: text_caps(),
            frame: Some(DynamicImage::new_rgb8(200, 100)),
            ..Default::default()
        }
        .with_element("Submit", &[Point::new(5, 5)]),
    );
    let detector: Arc<dyn TextDetector> = Arc::new(FixedText(vec![word("Submit", 100, 60)]));
    let backends = SessionBackends::from_source(driver)
        .with_text_detectors(FallbackGroup::single("ocr", detector));
    let (manager, _) = manager_with(backends);
    let healer = SelfHealer::new(manager);

    let calls = AtomicUsize::new(0);
    let healed = healer
        .act(ResolveRequest::new("Submit").unwrap(), |located| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(format!("tap at {} was swallowed", located.value))
                } else {
                    Ok(located.value)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(healed.action_attempts, 2);
    assert!(healed.healed());
    assert_eq!(healed.located.technique, Technique::OcrText);
    assert_eq!(healed.value, LocateValue::Coordinates(Point::new(115, 65)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failing_actions_are_not_reported_as_missing_elements() {
    let driver = Arc::new(
        FakeDriver {
            caps: text_caps(),
            frame: Some(DynamicImage::new_rgb8(200, 100)),
            ..Default::default()
        }
        .with_element("Submit", &[Point::new(5, 5)]),
    );
    let detector: Arc<dyn TextDetector> = Arc::new(FixedText(vec![word("Submit", 100, 60)]));
    let backends = SessionBackends::from_source(driver)
        .with_text_detectors(FallbackGroup::single("ocr", detector));
    let (manager, _) = manager_with(backends);
    let healer = SelfHealer::new(manager);

    let err = healer
        .act(ResolveRequest::new("Submit").unwrap(), |_| async {
            Err::<(), _>("element is disabled")
        })
        .await
        .unwrap_err();
    match err {
        LocatorError::AllAttemptsFailed {
            attempts,
            last_error,
            failures,
            technique_attempts,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(last_error, "element is disabled");
            let techniques: Vec<Technique> = failures.iter().map(|f| f.technique).collect();
            assert_eq!(techniques, vec![Technique::DirectText, Technique::OcrText]);
            assert_eq!(
                outcomes(&technique_attempts),
                vec![
                    (Technique::DirectText, "success"),
                    (Technique::OcrText, "success"),
                ]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_capability_fails_before_capture() {
    let driver = Arc::new(FakeDriver {
        caps: text_caps(),
        frame: Some(DynamicImage::new_rgb8(10, 10)),
        ..Default::default()
    });
    let (manager, sink) = manager_with(SessionBackends::from_source(driver.clone()));

    let err = manager
        .resolve(ResolveRequest::new("logo.png").unwrap())
        .await
        .err()
        .unwrap();
    match err {
        LocatorError::NoApplicableStrategy {
            classification,
            skipped,
            ..
        } => {
            assert_eq!(classification, soulheal_core_types::Classification::ImageTemplate);
            assert_eq!(
                skipped,
                vec!["image-template-matching: missing capability: template_matching".to_string()]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(driver.captures.load(Ordering::SeqCst), 0);
    assert!(sink.attempts().is_empty());
}

#[tokio::test]
async fn capture_failure_fails_vision_techniques_without_recapture() {
    let driver = Arc::new(FakeDriver {
        caps: text_caps(),
        frame: None,
        ..Default::default()
    });
    let detector: Arc<dyn TextDetector> = Arc::new(FixedText(vec![word("Login", 0, 0)]));
    let backends = SessionBackends::from_source(driver.clone())
        .with_text_detectors(FallbackGroup::single("ocr", detector));
    let (manager, _) = manager_with(backends);
    let healer = SelfHealer::new(manager);

    let err = assert_err!(healer.locate(ResolveRequest::new("Login").unwrap()).await);
    match err {
        LocatorError::NoLocationFound { target, attempts } => {
            assert_eq!(target, "Login");
            assert_eq!(
                outcomes(&attempts),
                vec![
                    (Technique::DirectText, "not_found"),
                    (Technique::OcrText, "failed"),
                ]
            );
            match &attempts[1].outcome {
                AttemptOutcome::Failed { reason } => {
                    assert!(reason.contains("display disconnected"), "{reason}")
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(driver.captures.load(Ordering::SeqCst), 1);
}

fn template_session(screen: &GrayImage) -> SessionBackends {
    let patch = image::imageops::crop_imm(screen, 5, 40, 10, 10).to_image();
    let store = MemoryTemplateStore::new();
    store.insert("corner.png", DynamicImage::ImageLuma8(patch));
    let matcher: Arc<dyn TemplateMatcher> =
        Arc::new(ImageprocMatcher::with_threshold(Arc::new(store), 0.99));
    let source: Arc<dyn ElementSource> =
        Arc::new(StaticFrameSource::new(DynamicImage::ImageLuma8(screen.clone())));
    SessionBackends::new(FallbackGroup::single("screen", source))
        .with_template_matchers(FallbackGroup::single("matchers", matcher))
}

#[tokio::test]
async fn area_of_interest_excludes_template_outside_it() {
    let screen = noise(80, 60);
    let (manager, _) = manager_with(template_session(&screen));
    let healer = SelfHealer::new(manager);

    let request = ResolveRequest::new("corner.png")
        .unwrap()
        .with_area(50.0, 0.0, 50.0, 50.0)
        .unwrap();
    let err = assert_err!(healer.locate(request).await);
    match err {
        LocatorError::NoLocationFound { attempts, .. } => {
            assert_eq!(
                outcomes(&attempts),
                vec![(Technique::ImageTemplate, "not_found")]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn area_of_interest_coordinates_map_back_to_the_screen() {
    let screen = noise(80, 60);
    let (manager, _) = manager_with(template_session(&screen));
    let healer = SelfHealer::new(manager);

    // (0,50,50,50) of 80x60 is the pixel region x 0..40, y 30..60
    let request = ResolveRequest::new("corner.png")
        .unwrap()
        .with_aoi("0,50,50,50".parse::<AreaOfInterest>().unwrap());
    let located = healer.locate(request).await.unwrap();
    assert_eq!(located.technique, Technique::ImageTemplate);
    assert_eq!(located.value, LocateValue::Coordinates(Point::new(10, 45)));
}

#[tokio::test]
async fn source_group_falls_back_to_next_driver() {
    let broken = Arc::new(FakeDriver {
        caps: SourceCapabilities {
            structural_lookup: true,
            ..Default::default()
        },
        broken: true,
        ..Default::default()
    });
    let healthy = Arc::new(
        FakeDriver {
            caps: SourceCapabilities {
                structural_lookup: true,
                ..Default::default()
            },
            ..Default::default()
        }
        .with_element("/root/item", &[Point::new(1, 2), Point::new(3, 4)]),
    );
    let group = FallbackGroup::new(
        "drivers",
        vec![broken.clone() as Arc<dyn ElementSource>, healthy.clone()],
    )
    .unwrap();
    let (manager, _) = manager_with(SessionBackends::new(group));
    let healer = SelfHealer::new(manager);

    let located = healer
        .locate(ResolveRequest::new("/root/item").unwrap().with_index(1))
        .await
        .unwrap();
    assert_eq!(located.value, LocateValue::Coordinates(Point::new(3, 4)));
    assert_eq!(broken.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn act_any_tries_alternative_targets_in_order() {
    let driver = Arc::new(
        FakeDriver {
            caps: text_caps(),
            ..Default::default()
        }
        .with_element("Sign in", &[Point::new(9, 9)]),
    );
    let (manager, _) = manager_with(SessionBackends::from_source(driver));
    let healer = SelfHealer::new(manager);

    let healed = healer
        .act_any(
            CandidateSet::from(json!(["Log in", "Sign in"])),
            0,
            AreaOfInterest::FULL,
            |located| async move { Ok::<_, String>(located.value) },
        )
        .await
        .unwrap();
    assert_eq!(healed.value, LocateValue::Coordinates(Point::new(9, 9)));

    let err = healer
        .act_any(
            CandidateSet::from(json!(["Log in", "Enter"])),
            0,
            AreaOfInterest::FULL,
            |located| async move { Ok::<_, String>(located.value) },
        )
        .await
        .unwrap_err();
    match err {
        ParamFallbackError::AllCombinationsFailed { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert!(matches!(attempts[0].1, LocatorError::NoApplicableStrategy { .. } | LocatorError::NoLocationFound { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn presence_combines_classification_groups() {
    let driver = Arc::new(
        FakeDriver {
            caps: SourceCapabilities {
                structural_lookup: true,
                text_lookup: true,
                ..Default::default()
            },
            ..Default::default()
        }
        .with_element("Welcome", &[Point::new(1, 1)]),
    );
    let (manager, sink) = manager_with(SessionBackends::from_source(driver));
    let targets = vec![
        Target::new("Welcome").unwrap(),
        Target::new("//div[@id='banner']").unwrap(),
    ];

    let any = manager
        .assert_presence(&targets, Duration::ZERO, PresenceRule::Any)
        .await
        .unwrap();
    assert!(any.present);
    assert_eq!(any.matched, vec!["Welcome".to_string()]);
    assert_eq!(any.missing, vec!["//div[@id='banner']".to_string()]);

    let all = manager
        .assert_presence(&targets, Duration::ZERO, PresenceRule::All)
        .await
        .unwrap();
    assert!(!all.present);
    assert!(!sink.attempts().is_empty());
}

#[tokio::test]
async fn unsupported_presence_group_counts_as_absent() {
    let driver = Arc::new(
        FakeDriver {
            caps: text_caps(),
            ..Default::default()
        }
        .with_element("Welcome", &[Point::new(1, 1)]),
    );
    let (manager, sink) = manager_with(SessionBackends::from_source(driver));
    let targets = vec![
        Target::new("logo.png").unwrap(),
        Target::new("Welcome").unwrap(),
    ];

    let any = manager
        .assert_presence(&targets, Duration::ZERO, PresenceRule::Any)
        .await
        .unwrap();
    assert!(any.present);
    assert_eq!(any.matched, vec!["Welcome".to_string()]);
    assert_eq!(any.missing, vec!["logo.png".to_string()]);
    assert!(sink
        .attempts()
        .iter()
        .any(|a| a.technique == Technique::ImageTemplate && a.outcome.label() == "skipped"));

    let all = manager
        .assert_presence(&targets, Duration::ZERO, PresenceRule::All)
        .await
        .unwrap();
    assert!(!all.present);

    let err = assert_err!(
        manager
            .assert_presence(
                &[Target::new("logo.png").unwrap()],
                Duration::ZERO,
                PresenceRule::Any
            )
            .await
    );
    assert!(matches!(err, LocatorError::NoApplicableStrategy { .. }));
}

#[tokio::test]
async fn direct_text_not_found_then_ocr_succeeds() {
    let driver = Arc::new(FakeDriver {
        caps: text_caps(),
        frame: Some(DynamicImage::new_rgb8(200, 100)),
        ..Default::default()
    });
    let detector: Arc<dyn TextDetector> = Arc::new(FixedText(vec![word("Login", 20, 30)]));
    let backends = SessionBackends::from_source(driver.clone())
        .with_text_detectors(FallbackGroup::single("ocr", detector));
    let (manager, sink) = manager_with(backends);
    let healer = SelfHealer::new(manager);

    let located = healer
        .locate(ResolveRequest::new("Login").unwrap())
        .await
        .unwrap();
    assert_eq!(located.technique, Technique::OcrText);
    assert_eq!(located.value, LocateValue::Coordinates(Point::new(35, 35)));
    assert_eq!(driver.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(
        outcomes(&sink.attempts()),
        vec![
            (Technique::DirectText, "not_found"),
            (Technique::OcrText, "success"),
        ]
    );
}
