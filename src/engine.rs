use crate::catalog::MediaCatalog;
use crate::geometry::{PopupGeometry, WorkArea, popup_geometry};
use crate::mode::Mode;
use crate::policy::{POKE_LINE, PopupDecision, PopupPolicy};
use crate::random::RandomSource;
use crate::resources::ResourceLoader;
use crate::scheduler::{PopupFrequency, TimerSchedule, next_tick, repeating};
use crate::settings::SettingsPatch;
use crate::store::SettingsStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Interval;
use tracing::{debug, info, warn};

pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(2_000);
pub const DEFAULT_IDLE_PROBABILITY: f64 = 0.5;
pub const DEFAULT_SPAWN_PROBABILITY: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    SpawnPopup { message: Option<String> },
    UpdateSettings(SettingsPatch),
    Poke,
    Stop,
}

/// One-way instructions for the presentation surfaces.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCommand {
    DisplayPopup {
        decision: PopupDecision,
        geometry: PopupGeometry,
    },
    DisplaySpeech {
        text: String,
    },
    SetDimOverlay {
        active: bool,
    },
    /// `None` means popup spawning is disabled.
    SetSpawnInterval {
        interval: Option<Duration>,
    },
    ModeChanged {
        mode: Mode,
    },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub work_area: WorkArea,
    pub idle: TimerSchedule,
    pub spawn_probability: f64,
    /// Stop on its own after this long; run until stopped when `None`.
    pub run_for: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_area: WorkArea::default(),
            idle: TimerSchedule {
                every: DEFAULT_IDLE_INTERVAL,
                probability: DEFAULT_IDLE_PROBABILITY,
            },
            spawn_probability: DEFAULT_SPAWN_PROBABILITY,
            run_for: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSummary {
    pub spawn_ticks: u64,
    pub popups: u64,
    pub speeches: u64,
    pub settings_updates: u64,
    pub failed_updates: u64,
}

pub struct PetEngine {
    policy: PopupPolicy,
    settings: Arc<dyn SettingsStore>,
}

impl PetEngine {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        catalog: Arc<dyn MediaCatalog>,
        loader: Arc<dyn ResourceLoader>,
    ) -> Self {
        Self {
            policy: PopupPolicy::new(settings.clone(), catalog, loader),
            settings,
        }
    }

    pub fn policy(&self) -> &PopupPolicy {
        &self.policy
    }

    pub async fn run(
        &self,
        config: EngineConfig,
        rng: Box<dyn RandomSource>,
        mut command_rx: Option<mpsc::UnboundedReceiver<ControlCommand>>,
        surface_tx: Option<mpsc::UnboundedSender<SurfaceCommand>>,
    ) -> Result<EngineSummary> {
        config.idle.validate().map_err(anyhow::Error::msg)?;
        if !(0.0..=1.0).contains(&config.spawn_probability) {
            anyhow::bail!(
                "spawn probability must be within [0, 1], got {}",
                config.spawn_probability
            );
        }

        let initial = self.settings.get_settings().unwrap_or_else(|err| {
            warn!(error = %err, "settings unavailable at startup, using standard mode");
            None
        });

        let mut session = Session {
            engine: self,
            config: &config,
            rng,
            surface_tx,
            mode: Mode::resolve(initial.as_ref()),
            dim_active: false,
            spawn_timer: None,
            summary: EngineSummary::default(),
        };
        info!(mode = %session.mode, "pet engine started");
        session.sync_dim_overlay();
        session.install_spawn_timer(initial.as_ref().and_then(|s| s.popups));

        let mut idle_timer = repeating(config.idle.every);
        let deadline = async {
            match config.run_for {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                cmd = next_command(&mut command_rx) => {
                    match cmd {
                        Some(cmd) => {
                            if session.handle_command(cmd).await {
                                info!("pet engine stopped");
                                break;
                            }
                        }
                        None => command_rx = None,
                    }
                }
                _ = next_tick(&mut session.spawn_timer) => session.on_spawn_tick().await,
                _ = idle_timer.tick() => session.on_idle_tick().await,
                _ = &mut deadline => {
                    info!("pet engine run limit reached");
                    break;
                }
            }
        }

        Ok(session.summary)
    }
}

struct Session<'a> {
    engine: &'a PetEngine,
    config: &'a EngineConfig,
    rng: Box<dyn RandomSource>,
    surface_tx: Option<mpsc::UnboundedSender<SurfaceCommand>>,
    mode: Mode,
    dim_active: bool,
    spawn_timer: Option<Interval>,
    summary: EngineSummary,
}

impl Session<'_> {
    /// Returns `true` when the engine should stop.
    async fn handle_command(&mut self, cmd: ControlCommand) -> bool {
        match cmd {
            ControlCommand::SpawnPopup { message } => {
                self.spawn_popup(message.as_deref()).await;
                false
            }
            ControlCommand::UpdateSettings(patch) => {
                self.apply_settings(&patch);
                false
            }
            ControlCommand::Poke => {
                self.speak(POKE_LINE.to_string());
                false
            }
            ControlCommand::Stop => true,
        }
    }

    async fn on_spawn_tick(&mut self) {
        self.summary.spawn_ticks += 1;
        if self.rng.chance(self.config.spawn_probability) {
            debug!("attempting to spawn popup");
            self.spawn_popup(None).await;
        }
    }

    async fn on_idle_tick(&mut self) {
        if !self.rng.chance(self.config.idle.probability) {
            return;
        }
        if let Some(line) = self.engine.policy.pick_idle_line(&mut *self.rng).await {
            self.speak(line);
        }
    }

    async fn spawn_popup(&mut self, message: Option<&str>) {
        let policy = &self.engine.policy;
        let Some(decision) = policy.decide_popup(message, &mut *self.rng).await else {
            return;
        };
        let image_size = decision
            .image
            .as_deref()
            .and_then(|path| policy.loader().image_size(path));
        let geometry = popup_geometry(self.config.work_area, image_size, &mut *self.rng);

        self.summary.popups += 1;
        self.send(SurfaceCommand::DisplayPopup { decision, geometry });
    }

    fn speak(&mut self, text: String) {
        self.summary.speeches += 1;
        self.send(SurfaceCommand::DisplaySpeech { text });
    }

    fn apply_settings(&mut self, patch: &SettingsPatch) {
        let merged = match self.engine.settings.update_settings(patch) {
            Ok(merged) => merged,
            Err(err) => {
                self.summary.failed_updates += 1;
                warn!(error = %err, "settings update failed");
                return;
            }
        };
        self.summary.settings_updates += 1;

        let mode = Mode::resolve(Some(&merged));
        if mode != self.mode {
            info!(from = %self.mode, to = %mode, "mode changed");
            self.mode = mode;
            self.send(SurfaceCommand::ModeChanged { mode });
        }
        self.sync_dim_overlay();

        if patch.popups.is_some() {
            self.install_spawn_timer(merged.popups);
        }
    }

    fn sync_dim_overlay(&mut self) {
        let active = self.mode.dims_screen();
        if active != self.dim_active {
            self.dim_active = active;
            self.send(SurfaceCommand::SetDimOverlay { active });
        }
    }

    /// Drop the current spawn timer and start one for `setting`. The old
    /// timer is owned by this session, so it cannot tick after this returns.
    fn install_spawn_timer(&mut self, setting: Option<u8>) {
        let frequency = PopupFrequency::from_setting(setting);
        let interval = frequency.interval();
        self.spawn_timer = interval.map(repeating);
        info!(frequency = frequency.index(), ?interval, "popup frequency set");
        self.send(SurfaceCommand::SetSpawnInterval { interval });
    }

    fn send(&self, command: SurfaceCommand) {
        if let Some(tx) = &self.surface_tx {
            let _ = tx.send(command);
        }
    }
}

async fn next_command(
    command_rx: &mut Option<mpsc::UnboundedReceiver<ControlCommand>>,
) -> Option<ControlCommand> {
    match command_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::{ControlCommand, EngineConfig, PetEngine, SurfaceCommand};
    use crate::catalog::{MediaItem, MediaKind, StaticCatalog};
    use crate::mode::Mode;
    use crate::policy::{DEFAULT_MESSAGES, POKE_LINE};
    use crate::random::ScriptedRandom;
    use crate::resources::MemoryResources;
    use crate::settings::{Settings, SettingsPatch};
    use crate::store::{DocumentStore, SettingsStore, StoreError};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn image(id: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            kind: MediaKind::Image,
            standard: true,
            path: id.to_string(),
        }
    }

    fn text(id: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            kind: MediaKind::Text,
            standard: true,
            path: id.to_string(),
        }
    }

    fn store_with(patch: SettingsPatch) -> Arc<DocumentStore> {
        let store = DocumentStore::in_memory();
        store.update_settings(&patch).expect("update");
        Arc::new(store)
    }

    fn engine(store: Arc<dyn SettingsStore>, items: Vec<MediaItem>) -> PetEngine {
        PetEngine::new(
            store,
            Arc::new(StaticCatalog::new(items)),
            Arc::new(
                MemoryResources::new()
                    .with_text("hello.txt", "hello from the pet")
                    .with_image("pic.png", 200, 100),
            ),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SurfaceCommand>) -> Vec<SurfaceCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    fn popups(commands: &[SurfaceCommand]) -> usize {
        commands
            .iter()
            .filter(|cmd| matches!(cmd, SurfaceCommand::DisplayPopup { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn dim_overlay_toggles_exactly_once_each_way() {
        let store = store_with(SettingsPatch {
            popups: Some(0),
            ..SettingsPatch::default()
        });
        let engine = engine(store, Vec::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();

        command_tx
            .send(ControlCommand::UpdateSettings(SettingsPatch {
                intensive_mode: Some(true),
                ..SettingsPatch::default()
            }))
            .expect("send");
        command_tx
            .send(ControlCommand::UpdateSettings(SettingsPatch {
                intensive_mode: Some(false),
                ..SettingsPatch::default()
            }))
            .expect("send");
        command_tx.send(ControlCommand::Stop).expect("send");

        let summary = engine
            .run(
                EngineConfig::default(),
                Box::new(ScriptedRandom::constant(0.99)),
                Some(command_rx),
                Some(surface_tx),
            )
            .await
            .expect("run");

        let commands = drain(&mut surface_rx);
        let dim_events: Vec<_> = commands
            .iter()
            .filter_map(|cmd| match cmd {
                SurfaceCommand::SetDimOverlay { active } => Some(*active),
                _ => None,
            })
            .collect();
        assert_eq!(dim_events, vec![true, false]);
        assert!(commands.contains(&SurfaceCommand::ModeChanged {
            mode: Mode::Intensive
        }));
        assert!(commands.contains(&SurfaceCommand::ModeChanged {
            mode: Mode::Standard
        }));
        assert_eq!(summary.settings_updates, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_in_intensive_mode_dims_immediately() {
        let store = store_with(SettingsPatch {
            intensive_mode: Some(true),
            popups: Some(0),
            ..SettingsPatch::default()
        });
        let engine = engine(store, Vec::new());
        let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();

        engine
            .run(
                EngineConfig {
                    run_for: Some(Duration::from_millis(100)),
                    ..EngineConfig::default()
                },
                Box::new(ScriptedRandom::constant(0.99)),
                None,
                Some(surface_tx),
            )
            .await
            .expect("run");

        let commands = drain(&mut surface_rx);
        assert_eq!(
            commands,
            vec![
                SurfaceCommand::SetDimOverlay { active: true },
                SurfaceCommand::SetSpawnInterval { interval: None },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn frequency_zero_never_spawns() {
        let store = store_with(SettingsPatch {
            popups: Some(0),
            ..SettingsPatch::default()
        });
        let engine = engine(store, vec![image("pic.png")]);
        let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();

        let summary = engine
            .run(
                EngineConfig {
                    run_for: Some(Duration::from_secs(60)),
                    ..EngineConfig::default()
                },
                Box::new(ScriptedRandom::constant(0.0)),
                None,
                Some(surface_tx),
            )
            .await
            .expect("run");

        assert_eq!(summary.spawn_ticks, 0);
        assert_eq!(popups(&drain(&mut surface_rx)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn frequency_update_cancels_the_previous_timer() {
        let store = store_with(SettingsPatch {
            popups: Some(1),
            ..SettingsPatch::default()
        });
        let engine = engine(store, vec![image("pic.png")]);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            engine
                .run(
                    EngineConfig {
                        run_for: Some(Duration::from_secs(30)),
                        ..EngineConfig::default()
                    },
                    Box::new(ScriptedRandom::constant(0.0)),
                    Some(command_rx),
                    Some(surface_tx),
                )
                .await
                .expect("run")
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        command_tx
            .send(ControlCommand::UpdateSettings(SettingsPatch {
                popups: Some(0),
                ..SettingsPatch::default()
            }))
            .expect("send");

        let summary = task.await.expect("join");
        assert_eq!(summary.spawn_ticks, 0);

        let commands = drain(&mut surface_rx);
        assert_eq!(popups(&commands), 0);
        assert_eq!(
            commands
                .iter()
                .filter(|cmd| matches!(cmd, SurfaceCommand::SetSpawnInterval { .. }))
                .cloned()
                .collect::<Vec<_>>(),
            vec![
                SurfaceCommand::SetSpawnInterval {
                    interval: Some(Duration::from_secs(10))
                },
                SurfaceCommand::SetSpawnInterval { interval: None },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn faster_frequency_takes_effect_from_the_update() {
        let store = store_with(SettingsPatch {
            popups: Some(0),
            ..SettingsPatch::default()
        });
        let engine = engine(store, vec![image("pic.png")]);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            engine
                .run(
                    EngineConfig {
                        run_for: Some(Duration::from_millis(3_250)),
                        ..EngineConfig::default()
                    },
                    Box::new(ScriptedRandom::constant(0.0)),
                    Some(command_rx),
                    Some(surface_tx),
                )
                .await
                .expect("run")
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        command_tx
            .send(ControlCommand::UpdateSettings(SettingsPatch {
                popups: Some(5),
                ..SettingsPatch::default()
            }))
            .expect("send");

        let summary = task.await.expect("join");
        // ticks at 1.5s, 2.0s, 2.5s and 3.0s
        assert_eq!(summary.spawn_ticks, 4);
        assert_eq!(summary.popups, 4);

        let commands = drain(&mut surface_rx);
        let first_popup = commands.iter().find_map(|cmd| match cmd {
            SurfaceCommand::DisplayPopup { decision, geometry } => Some((decision, geometry)),
            _ => None,
        });
        let (decision, geometry) = first_popup.expect("popup shown");
        assert_eq!(decision.image.as_deref(), Some("pic.png"));
        assert_eq!((geometry.width, geometry.height), (170, 115));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_speech_uses_text_pool_and_poke_speaks() {
        let store = store_with(SettingsPatch {
            popups: Some(0),
            ..SettingsPatch::default()
        });
        let engine = engine(store, vec![text("hello.txt")]);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();
        command_tx.send(ControlCommand::Poke).expect("send");

        let summary = engine
            .run(
                EngineConfig {
                    run_for: Some(Duration::from_millis(2_500)),
                    ..EngineConfig::default()
                },
                Box::new(ScriptedRandom::constant(0.0)),
                Some(command_rx),
                Some(surface_tx),
            )
            .await
            .expect("run");

        assert_eq!(summary.speeches, 2);
        let speech: Vec<_> = drain(&mut surface_rx)
            .into_iter()
            .filter_map(|cmd| match cmd {
                SurfaceCommand::DisplaySpeech { text } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(
            speech,
            vec![POKE_LINE.to_string(), "hello from the pet".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_pool_stays_silent() {
        let store = store_with(SettingsPatch {
            popups: Some(0),
            standard_mode: Some(false),
            ..SettingsPatch::default()
        });
        let engine = engine(store, vec![image("pic.png")]);

        let summary = engine
            .run(
                EngineConfig {
                    run_for: Some(Duration::from_secs(20)),
                    ..EngineConfig::default()
                },
                Box::new(ScriptedRandom::constant(0.0)),
                None,
                None,
            )
            .await
            .expect("run");

        assert_eq!(summary.speeches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_popup_request_is_shown() {
        let store = store_with(SettingsPatch {
            popups: Some(0),
            ..SettingsPatch::default()
        });
        let engine = engine(store, Vec::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();
        command_tx
            .send(ControlCommand::SpawnPopup {
                message: Some("Hello".to_string()),
            })
            .expect("send");
        command_tx
            .send(ControlCommand::SpawnPopup { message: None })
            .expect("send");
        command_tx.send(ControlCommand::Stop).expect("send");

        let summary = engine
            .run(
                EngineConfig::default(),
                Box::new(ScriptedRandom::constant(0.0)),
                Some(command_rx),
                Some(surface_tx),
            )
            .await
            .expect("run");

        assert_eq!(summary.popups, 2);
        let texts: Vec<_> = drain(&mut surface_rx)
            .into_iter()
            .filter_map(|cmd| match cmd {
                SurfaceCommand::DisplayPopup { decision, .. } => decision.text,
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Hello".to_string(), DEFAULT_MESSAGES[0].to_string()]);
    }

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn get_settings(&self) -> Result<Option<Settings>, StoreError> {
            Err(StoreError::Unavailable("settings collection".to_string()))
        }

        fn update_settings(&self, _patch: &SettingsPatch) -> Result<Settings, StoreError> {
            Err(StoreError::Unavailable("settings collection".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_store_is_logged_not_fatal() {
        let engine = engine(Arc::new(BrokenStore), vec![image("pic.png")]);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (surface_tx, mut surface_rx) = mpsc::unbounded_channel();
        command_tx
            .send(ControlCommand::UpdateSettings(SettingsPatch {
                intensive_mode: Some(true),
                ..SettingsPatch::default()
            }))
            .expect("send");

        let summary = engine
            .run(
                EngineConfig {
                    run_for: Some(Duration::from_secs(5)),
                    ..EngineConfig::default()
                },
                Box::new(ScriptedRandom::constant(0.0)),
                Some(command_rx),
                Some(surface_tx),
            )
            .await
            .expect("run");

        assert_eq!(summary.failed_updates, 1);
        assert_eq!(summary.popups, 0);
        assert!(summary.spawn_ticks >= 2);
        let commands = drain(&mut surface_rx);
        assert!(
            !commands
                .iter()
                .any(|cmd| matches!(cmd, SurfaceCommand::SetDimOverlay { .. }))
        );
    }

    #[tokio::test]
    async fn rejects_invalid_probability() {
        let engine = engine(store_with(SettingsPatch::default()), Vec::new());
        let result = engine
            .run(
                EngineConfig {
                    spawn_probability: 2.0,
                    ..EngineConfig::default()
                },
                Box::new(ScriptedRandom::constant(0.0)),
                None,
                None,
            )
            .await;
        assert!(result.is_err());
    }
}
