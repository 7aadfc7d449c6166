//! Tracker: the composition root
//!
//! Resolves the session, numbers the form's controls, creates one state machine
//! per control and the submission watcher, then turns host events into queued
//! collector sends. Nothing here panics into the host: transport and session
//! failures are logged and tracking carries on.

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::field::{number_controls, FieldOutcome, FieldStateMachine, NumberedControl};
use crate::form::{ControlId, DomEvent, Form};
use crate::navigation::{HistoryBackend, NavigationEvent, NavigationHub};
use crate::record::EventRecord;
use crate::session::{CookieJar, SessionManager, SessionState};
use crate::signals::{PageMetadata, SignalSource};
use crate::submission::{SubmissionWatcher, SubmitSignal};
use crate::transport::{
    Completion, Delivery, DispatchQueue, Outbound, SendMode, Transport, COLLECT_EVENT_PATH,
};
use log::{debug, info, warn};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Collaborators supplied by the embedding host
pub struct Host {
    pub clock: Box<dyn Clock>,
    pub transport: Box<dyn Transport>,
    pub cookies: Box<dyn CookieJar>,
    pub signals: Box<dyn SignalSource>,
    pub history: Box<dyn HistoryBackend>,
}

/// Instruments one form for the lifetime of a page
pub struct Tracker {
    config: TrackerConfig,
    clock: Box<dyn Clock>,
    transport: Box<dyn Transport>,
    cookies: Box<dyn CookieJar>,
    session: SessionManager,
    numbering: Vec<NumberedControl>,
    fields: BTreeMap<ControlId, FieldStateMachine>,
    watcher: SubmissionWatcher,
    navigation: NavigationHub,
    pushes: Rc<RefCell<Vec<NavigationEvent>>>,
    queue: DispatchQueue,
}

impl Tracker {
    /// Start tracking if the page opted in through its global embed object.
    ///
    /// Returns `None` when the object is absent, and logs and returns `None` when
    /// setup fails.
    pub fn activate(
        global: Option<&Value>,
        api_host: &str,
        page: PageMetadata,
        form: Option<&Form>,
        host: Host,
    ) -> Option<Self> {
        let config = match TrackerConfig::from_global(global, api_host) {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("no embed object on page, staying inert");
                return None;
            }
            Err(e) => {
                warn!("ignoring embed object: {}", e);
                return None;
            }
        };

        match Self::start(config, page, form, host) {
            Ok(tracker) => Some(tracker),
            Err(e) => {
                warn!("tracker not started: {}", e);
                None
            }
        }
    }

    /// Start tracking `form`. The session is resolved before any control is
    /// instrumented, so every record carries the same session.
    pub fn start(
        config: TrackerConfig,
        page: PageMetadata,
        form: Option<&Form>,
        host: Host,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        let form = form.ok_or(TrackerError::NoForm)?;

        let Host {
            clock,
            transport,
            mut cookies,
            signals,
            history,
        } = host;

        let mut session = SessionManager::new();
        session.load_session(
            cookies.as_mut(),
            transport.as_ref(),
            signals,
            &config.pixel_id,
            &page,
            clock.now_ms(),
        );
        let session_id = session.session_id();

        let numbering = number_controls(&form.controls);
        let fields = numbering
            .iter()
            .map(|n| {
                let control = &form.controls[n.id.0];
                let machine = FieldStateMachine::new(n.id, control, n.field_number, session_id.clone());
                (n.id, machine)
            })
            .collect();

        let mut navigation = NavigationHub::new();
        navigation.install(history);
        let pushes = Rc::new(RefCell::new(Vec::new()));
        let inbox = Rc::clone(&pushes);
        navigation.subscribe(move |event: &NavigationEvent| inbox.borrow_mut().push(event.clone()));

        info!(
            "tracking {} controls for pixel {}",
            numbering.len(),
            config.pixel_id
        );

        Ok(Self {
            queue: DispatchQueue::new(config.queue_capacity),
            watcher: SubmissionWatcher::new(&page.location),
            config,
            clock,
            transport,
            cookies,
            session,
            numbering,
            fields,
            navigation,
            pushes,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn session_state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session.session_id()
    }

    pub fn cookies(&self) -> &dyn CookieJar {
        self.cookies.as_ref()
    }

    /// Controls in field-number order
    pub fn numbering(&self) -> &[NumberedControl] {
        &self.numbering
    }

    pub fn field_number(&self, id: ControlId) -> Option<usize> {
        self.fields.get(&id).map(FieldStateMachine::field_number)
    }

    pub fn field(&self, id: ControlId) -> Option<&FieldStateMachine> {
        self.fields.get(&id)
    }

    pub fn watcher(&self) -> &SubmissionWatcher {
        &self.watcher
    }

    /// The history hub, for hosts and collaborators that want to observe pushes
    pub fn navigation_mut(&mut self) -> &mut NavigationHub {
        &mut self.navigation
    }

    /// Number of sends waiting for the next pump
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Feed one DOM event for a control. `form` holds the control's current state.
    pub fn dispatch(&mut self, form: &Form, id: ControlId, event: &DomEvent) -> Result<FieldOutcome, TrackerError> {
        let control = form.control(id).ok_or(TrackerError::UnknownControl(id.0))?;
        let machine = self
            .fields
            .get_mut(&id)
            .ok_or(TrackerError::UnknownControl(id.0))?;

        let now = self.clock.now_ms();
        let outcome = machine.handle(event, control, now, self.config.no_raw_data);
        if let FieldOutcome::Finalized(record) = &outcome {
            debug!("field {} finalized", record.field.as_ref().map_or(0, |f| f.field_number));
            self.enqueue(record, Completion::None);
        }
        Ok(outcome)
    }

    /// Native form submit. Returns `true` if a form-submitted record was queued.
    pub fn submit(&mut self) -> bool {
        self.drain_pushes();
        self.on_submit_signal(SubmitSignal::NativeSubmit)
    }

    /// Window before-unload: the form-submitted record (if any) is delivered
    /// immediately, then the backlog is flushed, all in blocking mode.
    ///
    /// History pushes still waiting in the hub inbox are handled first, so a
    /// push that already armed the guard suppresses the unload record.
    pub fn before_unload(&mut self) -> Vec<Delivery> {
        // pushes seen by the hub precede the unload
        self.drain_pushes();
        let now = self.clock.now_ms();
        let mut deliveries = Vec::new();

        if let Some(record) = self
            .watcher
            .on_signal(SubmitSignal::BeforeUnload, self.session.session_id(), now)
        {
            let outbound = Outbound::new(COLLECT_EVENT_PATH, record.to_json(), Completion::ReleaseSubmitGuard);
            deliveries.push(DispatchQueue::deliver(self.transport.as_ref(), outbound, SendMode::Blocking));
        }
        deliveries.extend(self.queue.pump(self.transport.as_ref(), SendMode::Blocking));

        for delivery in &deliveries {
            self.complete(delivery);
        }
        deliveries
    }

    /// History push routed through the tracker's navigation hub
    pub fn push_state(&mut self, event: &NavigationEvent) {
        self.navigation.push_state(event);
        self.drain_pushes();
    }

    /// Deliver every queued send. Called by the host on its idle tick.
    pub fn pump(&mut self) -> Vec<Delivery> {
        self.drain_pushes();
        let deliveries = self.queue.pump(self.transport.as_ref(), SendMode::Async);
        for delivery in &deliveries {
            self.complete(delivery);
        }
        deliveries
    }

    fn drain_pushes(&mut self) {
        let pushes = std::mem::take(&mut *self.pushes.borrow_mut());
        for event in pushes {
            if let Some(url) = &event.url {
                self.watcher.set_location(url);
            }
            self.on_submit_signal(SubmitSignal::HistoryPush);
        }
    }

    fn on_submit_signal(&mut self, signal: SubmitSignal) -> bool {
        let now = self.clock.now_ms();
        match self.watcher.on_signal(signal, self.session.session_id(), now) {
            Some(record) => {
                self.enqueue(&record, Completion::ReleaseSubmitGuard);
                true
            }
            None => false,
        }
    }

    fn enqueue(&mut self, record: &EventRecord, completion: Completion) {
        let outbound = Outbound::new(COLLECT_EVENT_PATH, record.to_json(), completion);
        if let Some(evicted) = self.queue.enqueue(outbound) {
            self.complete(&evicted);
        }
    }

    fn complete(&mut self, delivery: &Delivery) {
        if let Err(e) = &delivery.result {
            debug!("delivery {} failed: {}", delivery.id, e);
        }
        if delivery.completion == Completion::ReleaseSubmitGuard {
            self.watcher.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, Millis};
    use crate::error::TransportError;
    use crate::field::content_hash;
    use crate::form::Control;
    use crate::navigation::DetachedHistory;
    use crate::session::{DocumentCookieJar, SESSION_COOKIE};
    use crate::signals::{Environment, ProbeReadings, StaticSignals};
    use crate::transport::{OfflineTransport, OPEN_SESSION_PATH};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const LOCATION: &str = "https://shop.example/checkout";

    struct Fixture {
        clock: Rc<ManualClock>,
        transport: Rc<OfflineTransport>,
        form: Form,
    }

    impl Fixture {
        fn new(form: Form) -> Self {
            Self {
                clock: Rc::new(ManualClock::new(0)),
                transport: Rc::new(OfflineTransport::with_session_id("sess-1")),
                form,
            }
        }

        fn host(&self, cookie: &str) -> Host {
            Host {
                clock: Box::new(Rc::clone(&self.clock)),
                transport: Box::new(Rc::clone(&self.transport)),
                cookies: Box::new(DocumentCookieJar::from_header(cookie)),
                signals: Box::new(StaticSignals(ProbeReadings::default())),
                history: Box::new(DetachedHistory),
            }
        }

        fn page(&self) -> PageMetadata {
            PageMetadata::capture(&Environment::default(), LOCATION, "", "Checkout", &self.form)
        }

        fn start(&self, config: TrackerConfig) -> Tracker {
            Tracker::start(config, self.page(), Some(&self.form), self.host("")).unwrap()
        }

        fn at(&self, now: Millis) {
            self.clock.set(now);
        }

        fn events(&self) -> Vec<Value> {
            self.transport
                .requests_to(COLLECT_EVENT_PATH)
                .into_iter()
                .map(|r| r.payload)
                .collect()
        }
    }

    fn config() -> TrackerConfig {
        TrackerConfig::new("px-1", "collect.example")
    }

    fn signup_form() -> Form {
        Form::new(vec![
            Control::input("email").with_name("email"),
            Control::input("password").with_name("password"),
            Control::button("submit"),
        ])
    }

    #[test]
    fn test_activate_requires_embed_object() {
        let fixture = Fixture::new(signup_form());
        let tracker = Tracker::activate(None, "collect.example", fixture.page(), Some(&fixture.form), fixture.host(""));
        assert!(tracker.is_none());
        assert!(fixture.transport.requests().is_empty());

        let global = json!({"cid": "px-1", "nodata": true});
        let tracker = Tracker::activate(
            Some(&global),
            "collect.example",
            fixture.page(),
            Some(&fixture.form),
            fixture.host(""),
        )
        .unwrap();
        assert!(tracker.config().no_raw_data);
        assert_eq!(tracker.session_id().as_deref(), Some("sess-1"));
    }

    #[test]
    fn test_activate_without_form_is_inert() {
        let fixture = Fixture::new(signup_form());
        let global = json!({"cid": "px-1"});
        assert!(Tracker::activate(Some(&global), "collect.example", fixture.page(), None, fixture.host("")).is_none());
        assert!(matches!(
            Tracker::start(config(), fixture.page(), None, fixture.host("")),
            Err(TrackerError::NoForm)
        ));
    }

    #[test]
    fn test_field_record_is_queued_until_pump() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(config());
        let email = ControlId(0);

        fixture.at(100);
        tracker.dispatch(&fixture.form, email, &DomEvent::Focus).unwrap();
        fixture.at(150);
        tracker.dispatch(&fixture.form, email, &DomEvent::key_down("a")).unwrap();

        let mut form = fixture.form.clone();
        form.controls[0].value = "Ann@Example.com".to_string();
        fixture.at(400);
        let outcome = tracker.dispatch(&form, email, &DomEvent::Blur).unwrap();
        assert!(matches!(outcome, FieldOutcome::Finalized(_)));

        assert_eq!(tracker.pending(), 1);
        assert!(fixture.events().is_empty());

        let deliveries = tracker.pump();
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].is_ok());

        let events = fixture.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event["session"], "sess-1");
        assert_eq!(event["eventType"], "field-filled");
        assert_eq!(event["fieldNumber"], 1);
        assert_eq!(event["duration"], 300);
        assert_eq!(event["keypressCount"], 1);
        assert_eq!(event["openData"], "Ann@Example.com");
        assert_eq!(event["hashData"], content_hash("Ann@Example.com"));
    }

    #[test]
    fn test_no_raw_data_drops_open_data() {
        let mut form = signup_form();
        form.controls[1].value = "hunter2".to_string();
        let fixture = Fixture::new(form);
        let mut tracker = fixture.start(TrackerConfig {
            no_raw_data: true,
            ..config()
        });

        tracker.dispatch(&fixture.form, ControlId(1), &DomEvent::Blur).unwrap();
        tracker.pump();

        let event = &fixture.events()[0];
        assert!(event.get("openData").is_none());
        assert_eq!(event["hashData"], content_hash("hunter2"));
        assert_eq!(event["textLength"], 7);
    }

    #[test]
    fn test_cookie_skips_open_session() {
        let fixture = Fixture::new(signup_form());
        let cookie = format!("{}=kept", SESSION_COOKIE);
        let tracker = Tracker::start(config(), fixture.page(), Some(&fixture.form), fixture.host(&cookie)).unwrap();

        assert_eq!(tracker.session_id().as_deref(), Some("kept"));
        assert!(fixture.transport.requests_to(OPEN_SESSION_PATH).is_empty());
    }

    #[test]
    fn test_failed_session_sends_records_without_session() {
        let fixture = Fixture::new(signup_form());
        fixture
            .transport
            .fail_path(OPEN_SESSION_PATH, TransportError::new(500, "Internal Server Error"));
        let mut tracker = fixture.start(config());
        assert_eq!(tracker.session_state(), &SessionState::Failed);

        tracker.dispatch(&fixture.form, ControlId(0), &DomEvent::Blur).unwrap();
        assert!(tracker.submit());
        tracker.pump();

        let events = fixture.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.get("session").is_none()));
        assert_eq!(fixture.transport.requests_to(OPEN_SESSION_PATH).len(), 1);
    }

    #[test]
    fn test_submit_guard_released_after_send() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(config());

        fixture.at(5_000);
        assert!(tracker.submit());
        assert!(!tracker.submit());
        tracker.push_state(&NavigationEvent::to("https://shop.example/thanks"));
        assert_eq!(tracker.pending(), 1);

        tracker.pump();
        assert!(!tracker.watcher().submit_in_progress());
        assert_eq!(tracker.watcher().current_location(), "https://shop.example/thanks");

        let events = fixture.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["eventType"], "form-submitted");
        assert_eq!(events[0]["started"], 5_000);
        assert_eq!(events[0]["finished"], 5_000);
        assert_eq!(events[0]["duration"], 0);
        assert!(events[0].get("fieldNumber").is_none());

        // guard is open again
        assert!(tracker.submit());
    }

    #[test]
    fn test_failed_submit_send_still_releases_guard() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(config());
        fixture.transport.fail_with(TransportError::connection_timeout());

        assert!(tracker.submit());
        let deliveries = tracker.pump();
        assert!(!deliveries[0].is_ok());
        assert!(!tracker.watcher().submit_in_progress());
    }

    #[test]
    fn test_before_unload_sends_blocking_and_flushes() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(config());

        tracker.dispatch(&fixture.form, ControlId(0), &DomEvent::Blur).unwrap();
        tracker.dispatch(&fixture.form, ControlId(1), &DomEvent::Blur).unwrap();
        let deliveries = tracker.before_unload();
        assert_eq!(deliveries.len(), 3);
        assert_eq!(tracker.pending(), 0);

        let sent = fixture.transport.requests_to(COLLECT_EVENT_PATH);
        assert!(sent.iter().all(|r| r.mode == SendMode::Blocking));
        assert_eq!(sent[0].payload["eventType"], "form-submitted");
        assert_eq!(sent[1].payload["fieldNumber"], 1);
        assert_eq!(sent[2].payload["fieldNumber"], 2);
        assert!(!tracker.watcher().submit_in_progress());
    }

    #[test]
    fn test_history_push_from_hub_is_seen_on_pump() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(config());

        tracker
            .navigation_mut()
            .push_state(&NavigationEvent::to("https://shop.example/next"));
        assert_eq!(tracker.pending(), 0);

        tracker.pump();
        assert_eq!(fixture.events().len(), 1);
        assert_eq!(tracker.watcher().current_location(), "https://shop.example/next");
    }

    #[test]
    fn test_hub_push_before_unload_sends_one_submission() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(config());

        tracker
            .navigation_mut()
            .push_state(&NavigationEvent::to("https://shop.example/next"));
        let deliveries = tracker.before_unload();
        assert_eq!(deliveries.len(), 1);
        tracker.pump();

        let submitted: Vec<Value> = fixture
            .events()
            .into_iter()
            .filter(|e| e["eventType"] == "form-submitted")
            .collect();
        assert_eq!(submitted.len(), 1);
        assert_eq!(tracker.watcher().current_location(), "https://shop.example/next");
        assert!(!tracker.watcher().submit_in_progress());
    }

    #[test]
    fn test_hub_push_before_submit_sends_one_submission() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(config());

        tracker
            .navigation_mut()
            .push_state(&NavigationEvent::to("https://shop.example/next"));
        assert!(!tracker.submit());
        assert_eq!(tracker.pending(), 1);

        tracker.pump();
        assert_eq!(fixture.events().len(), 1);
    }

    #[test]
    fn test_open_session_uses_startup_mode() {
        let fixture = Fixture::new(signup_form());
        let _tracker = fixture.start(config());

        let modes: Vec<SendMode> = fixture
            .transport
            .requests_to(OPEN_SESSION_PATH)
            .iter()
            .map(|r| r.mode)
            .collect();
        assert_eq!(modes, vec![SendMode::Startup]);
    }

    #[test]
    fn test_queue_eviction_releases_guard() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(TrackerConfig {
            queue_capacity: 1,
            ..config()
        });

        assert!(tracker.submit());
        assert!(tracker.watcher().submit_in_progress());

        // evicts the form-submitted send
        tracker.dispatch(&fixture.form, ControlId(0), &DomEvent::Blur).unwrap();
        assert!(!tracker.watcher().submit_in_progress());
        assert_eq!(tracker.pending(), 1);
    }

    #[test]
    fn test_unknown_control() {
        let fixture = Fixture::new(signup_form());
        let mut tracker = fixture.start(config());
        assert!(matches!(
            tracker.dispatch(&fixture.form, ControlId(9), &DomEvent::Focus),
            Err(TrackerError::UnknownControl(9))
        ));
    }

    #[test]
    fn test_field_numbers_follow_tab_order() {
        let form = Form::new(vec![
            Control::input("text").with_tab_index(3),
            Control::input("text").with_tab_index(1),
            Control::input("text"),
        ]);
        let fixture = Fixture::new(form);
        let tracker = fixture.start(config());

        assert_eq!(tracker.field_number(ControlId(1)), Some(1));
        assert_eq!(tracker.field_number(ControlId(0)), Some(2));
        assert_eq!(tracker.field_number(ControlId(2)), Some(3));
        assert_eq!(tracker.numbering()[0].id, ControlId(1));
    }
}
