//! Navigation state machine.
//!
//! User actions (pan, jump) are mapped to new [`TimeWindow`]s by the pure
//! [`transition`] function; [`NavigationController`] applies them, publishes
//! the new [`NavigationState`] on a `watch` channel and loads the window
//! through the session.
//!
//! Bounds:
//!
//! - Backward actions are disabled once the window starts at or before the
//!   earliest row of the earliest shard (when that is known).
//! - Forward actions are disabled in Latest mode. Moving forward onto or
//!   past the current time switches to Latest mode.
//!
//! Navigation never refreshes shards and never sends `HEAD` requests.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

use crate::{
    clock::Clock,
    config::NavigationConfig,
    session::{SessionResult, ShardSession, SpanData},
    shard::{EntityId, MonthKey},
    window::TimeWindow,
};

/// A user navigation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    /// Back by a small page of rows.
    PanBackSmall,
    /// Forward by a small page of rows.
    PanForwardSmall,
    /// Back by the window's own width.
    PanBackPlot,
    /// Forward by the window's own width.
    PanForwardPlot,
    /// To the first data.
    JumpEarliest,
    /// To Latest mode.
    JumpLatest,
    /// End the window at a fixed instant.
    JumpTo(DateTime<Utc>),
    /// Keep the end, change the width.
    SetDuration(Duration),
}

impl NavAction {
    /// True for actions that move towards older data.
    pub fn is_backward(&self) -> bool {
        matches!(
            self,
            NavAction::PanBackSmall | NavAction::PanBackPlot | NavAction::JumpEarliest
        )
    }

    /// True for actions that move towards newer data.
    pub fn is_forward(&self) -> bool {
        matches!(
            self,
            NavAction::PanForwardSmall | NavAction::PanForwardPlot | NavAction::JumpLatest
        )
    }
}

/// Data limits navigation respects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    /// First timestamp of the data, if known.
    pub earliest: Option<DateTime<Utc>>,
}

/// Published navigation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    /// Current window.
    pub window: TimeWindow,
    /// Selected entities.
    pub entities: Vec<EntityId>,
    /// Whether backward actions are enabled.
    pub can_go_back: bool,
    /// Whether forward actions are enabled.
    pub can_go_forward: bool,
}

/// True unless the window already starts at or before the earliest data.
pub fn can_go_back(window: &TimeWindow, bounds: &Bounds, now: DateTime<Utc>) -> bool {
    let (start, _) = window.resolve(now);
    bounds.earliest.is_none_or(|earliest| start > earliest)
}

/// True unless the window is in Latest mode.
pub fn can_go_forward(window: &TimeWindow) -> bool {
    !window.is_latest()
}

/// Window after `action`, or `None` when the action is disabled.
pub fn transition(
    window: &TimeWindow,
    action: NavAction,
    bounds: &Bounds,
    config: &NavigationConfig,
    now: DateTime<Utc>,
) -> Option<TimeWindow> {
    if action.is_backward() && !can_go_back(window, bounds, now) {
        return None;
    }
    if action.is_forward() && !can_go_forward(window) {
        return None;
    }

    let (_, end) = window.resolve(now);
    let clamp_back = |end: DateTime<Utc>| match bounds.earliest {
        Some(earliest) if end - window.duration() < earliest => earliest + window.duration(),
        _ => end,
    };
    let forward_to = |end: DateTime<Utc>| {
        if end >= now {
            TimeWindow::latest(window.duration())
        } else {
            window.ending_at(end)
        }
    };

    let next = match action {
        NavAction::PanBackSmall => window.ending_at(clamp_back(end - config.small_page())),
        NavAction::PanBackPlot => window.ending_at(clamp_back(end - window.duration())),
        NavAction::PanForwardSmall => forward_to(end + config.small_page()),
        NavAction::PanForwardPlot => forward_to(end + window.duration()),
        NavAction::JumpEarliest => window.ending_at(bounds.earliest? + window.duration()),
        NavAction::JumpLatest => TimeWindow::latest(window.duration()),
        NavAction::JumpTo(ts) => forward_to(clamp_back(ts)),
        NavAction::SetDuration(duration) => {
            if duration <= Duration::zero() {
                return None;
            }
            window.with_duration(duration)
        }
    };
    Some(next)
}

/// Per-entity result of loading the current window.
#[derive(Debug)]
pub struct EntityLoad {
    /// Entity.
    pub entity: EntityId,
    /// What was loaded.
    pub span: SpanData,
}

/// Outcome of [`NavigationController::apply`].
#[derive(Debug)]
pub enum NavOutcome {
    /// The action is disabled at the current position; nothing changed.
    Disabled,
    /// The window moved and was loaded.
    Loaded(Vec<EntityLoad>),
}

/// Drives navigation for one view.
#[derive(Debug)]
pub struct NavigationController {
    session: Arc<ShardSession>,
    clock: Arc<dyn Clock>,
    config: NavigationConfig,
    state: watch::Sender<NavigationState>,
}

impl NavigationController {
    /// Controller starting at `window` over `entities`.
    pub fn new(
        session: Arc<ShardSession>,
        clock: Arc<dyn Clock>,
        config: NavigationConfig,
        entities: Vec<EntityId>,
        window: TimeWindow,
    ) -> Self {
        let initial = NavigationState {
            window,
            entities,
            can_go_back: true,
            can_go_forward: can_go_forward(&window),
        };
        let (state, _) = watch::channel(initial);
        Self {
            session,
            clock,
            config,
            state,
        }
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<NavigationState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    /// Session backing this controller.
    pub fn session(&self) -> &Arc<ShardSession> {
        &self.session
    }

    /// Earliest data across all selected entities, once every one is known.
    pub fn bounds(&self) -> Bounds {
        let entities = self.state.borrow().entities.clone();
        let mut earliest: Option<DateTime<Utc>> = None;
        for entity in &entities {
            let Some(e) = self.session.known_earliest(entity) else {
                return Bounds::default();
            };
            earliest = Some(earliest.map_or(e, |cur| cur.min(e)));
        }
        Bounds { earliest }
    }

    fn publish(&self, window: TimeWindow, entities: Option<Vec<EntityId>>) {
        let bounds = self.bounds();
        let now = self.clock.now();
        self.state.send_modify(|state| {
            state.window = window;
            if let Some(entities) = entities {
                state.entities = entities;
            }
            state.can_go_back = can_go_back(&window, &bounds, now);
            state.can_go_forward = can_go_forward(&window);
        });
    }

    /// Replace the selected entities and reload.
    pub async fn select(&self, entities: Vec<EntityId>) -> Vec<EntityLoad> {
        let window = self.state.borrow().window;
        self.publish(window, Some(entities));
        self.load().await
    }

    /// Replace the window (for example from its compact text form) and reload.
    pub async fn set_window(&self, window: TimeWindow) -> Vec<EntityLoad> {
        self.publish(window, None);
        self.load().await
    }

    /// Apply `action`, publish the new state and load the new window.
    pub async fn apply(&self, action: NavAction) -> SessionResult<NavOutcome> {
        let current = self.state.borrow().window;
        let mut bounds = self.bounds();

        if action == NavAction::JumpEarliest && bounds.earliest.is_none() {
            bounds.earliest = self.discover_earliest(&current).await?;
        }

        let now = self.clock.now();
        let Some(next) = transition(&current, action, &bounds, &self.config, now) else {
            tracing::debug!(?action, "Navigation action disabled");
            self.publish(current, None);
            return Ok(NavOutcome::Disabled);
        };

        tracing::debug!(?action, window = ?next.encode(), "Navigating");
        self.publish(next, None);
        Ok(NavOutcome::Loaded(self.load().await))
    }

    /// Walk back from the current window to find the first data of every entity.
    async fn discover_earliest(&self, current: &TimeWindow) -> SessionResult<Option<DateTime<Utc>>> {
        let (start, _) = current.resolve(self.clock.now());
        let from = MonthKey::of(start);
        let entities = self.state.borrow().entities.clone();

        let mut earliest: Option<DateTime<Utc>> = None;
        for entity in &entities {
            if let Some((_, ts)) = self
                .session
                .find_earliest(entity, from, self.config.max_lookback_months)
                .await?
            {
                earliest = Some(earliest.map_or(ts, |cur| cur.min(ts)));
            }
        }
        Ok(earliest)
    }

    /// Load the current window for every selected entity.
    pub async fn load(&self) -> Vec<EntityLoad> {
        let state = self.state();
        let (start, end) = state.window.resolve(self.clock.now());
        let mut out = Vec::with_capacity(state.entities.len());
        for entity in state.entities {
            let span = self.session.load_span(&entity, start, end).await;
            out.push(EntityLoad { entity, span });
        }
        // Loading may have discovered the data boundary.
        self.publish(state.window, None);
        out
    }
}
