//! Idempotent item-tagging reconciliation.
//!
//! Every vault item is tagged with a back-reference encoding its own id, so
//! the host application can resolve a stored credential to its local record
//! and vice versa. Login items carry the marker as a URI entry; everything
//! else carries it as a custom field. Re-running the pass over an
//! already-tagged vault is a no-op, which makes it safe to re-run after a
//! partial failure.

use crate::api::VaultApi;
use crate::error::{Error, Result};
use crate::models::{Field, FieldKind, UriEntry, UriMatchType, VaultItem};
use crate::process::VaultServer;
use crate::progress::ProgressReporter;
use crate::session::SessionController;

/// Default URI scheme for encoded back-references.
pub const DEFAULT_SCHEME: &str = "vaultlink";
/// Default name of the marker field on non-login items.
pub const DEFAULT_MARKER_FIELD: &str = "vaultlink-id";

/// Identity-scheme configuration: the URI scheme and marker field name used
/// to encode `"<scheme>:<item-id>"`.
#[derive(Debug, Clone)]
pub struct MarkerConfig {
    pub scheme: String,
    pub field_name: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            field_name: DEFAULT_MARKER_FIELD.to_string(),
        }
    }
}

impl MarkerConfig {
    fn encode(&self, id: &str) -> String {
        format!("{}:{}", self.scheme, id)
    }

    /// The value's scheme-stripped tail, when the scheme prefix matches
    /// (case-insensitively).
    fn strip_scheme<'v>(&self, value: &'v str) -> Option<&'v str> {
        let prefix_len = self.scheme.len() + 1;
        let prefix = value.get(..prefix_len)?;
        let scheme_matches = prefix[..self.scheme.len()].eq_ignore_ascii_case(&self.scheme);
        (scheme_matches && prefix.ends_with(':')).then(|| &value[prefix_len..])
    }

    fn has_scheme(&self, value: &str) -> bool {
        self.strip_scheme(value).is_some()
    }

    /// True when `value` decodes to exactly this item's own id. A marker
    /// pointing at a different id is staleness and is never trusted.
    fn is_self_marker(&self, value: &str, id: &str) -> bool {
        self.strip_scheme(value)
            .is_some_and(|tail| tail.eq_ignore_ascii_case(id))
    }
}

/// Result of a full tagging pass.
#[derive(Debug, Default)]
pub struct TagOutcome {
    /// The item whose id equals the requested target, if the vault holds it.
    pub matched: Option<VaultItem>,
    /// Number of items rewritten during the pass.
    pub changed: usize,
}

/// Sweeps the whole vault, bringing every item's marker to canonical state.
pub struct ReconciliationEngine {
    marker: MarkerConfig,
}

impl ReconciliationEngine {
    pub fn new(marker: MarkerConfig) -> Self {
        Self { marker }
    }

    /// Tag every vault item and look up `target_id` along the way.
    ///
    /// Runs against an unlocked vault: syncs first, fetches all items, and
    /// walks them in returned order. A soft-failed fetch yields an empty
    /// outcome; a failed item push aborts the pass (already-pushed items stay
    /// pushed, and re-running is safe).
    pub fn tag_all_items<A: VaultApi, S: VaultServer>(
        &self,
        session: &mut SessionController<A, S>,
        target_id: &str,
        progress: &mut dyn ProgressReporter,
    ) -> Result<TagOutcome> {
        session.run_with_unlocked_vault(|api| {
            // Work from the backend's latest state.
            if !api.sync()? {
                tracing::warn!("vault sync reported failure; tagging the last known state");
            }
            let Some(items) = api.items()? else {
                tracing::info!("item fetch soft-failed; nothing to tag");
                return Ok(TagOutcome::default());
            };

            let total = items.len();
            let mut outcome = TagOutcome::default();
            for (index, mut item) in items.into_iter().enumerate() {
                if self.apply_marker(&mut item) {
                    if !api.put_item(&item)? {
                        return Err(Error::Rejected("item update"));
                    }
                    outcome.changed += 1;
                }
                if item.id.eq_ignore_ascii_case(target_id) {
                    outcome.matched = Some(item);
                }
                progress.report((index + 1) as f64 / total as f64);
            }
            tracing::info!(total, changed = outcome.changed, "tagging pass complete");
            Ok(outcome)
        })
    }

    /// Bring one item's marker to canonical state; returns whether the item
    /// was modified and needs to be pushed back.
    pub fn apply_marker(&self, item: &mut VaultItem) -> bool {
        let marker_value = self.marker.encode(&item.id);
        let mut changed = false;

        if let Some(login) = item.login.as_mut() {
            // Markers belong on the URI list for login items; a marker field
            // here is stray.
            let fields_before = item.fields.len();
            item.fields
                .retain(|field| field.name != self.marker.field_name);
            changed |= item.fields.len() != fields_before;

            match login.uris.iter_mut().find(|u| self.marker.has_scheme(&u.uri)) {
                Some(entry) if self.marker.is_self_marker(&entry.uri, &item.id) => {}
                Some(entry) => {
                    entry.uri = marker_value;
                    entry.match_type = Some(UriMatchType::Never);
                    changed = true;
                }
                None => {
                    // Appended: a synthetic entry must not shadow
                    // user-authored ones.
                    login.uris.push(UriEntry {
                        uri: marker_value,
                        match_type: Some(UriMatchType::Never),
                    });
                    changed = true;
                }
            }
        } else {
            match item
                .fields
                .iter_mut()
                .find(|field| field.name == self.marker.field_name)
            {
                Some(field)
                    if field
                        .value
                        .as_deref()
                        .is_some_and(|v| self.marker.is_self_marker(v, &item.id)) => {}
                Some(field) => {
                    field.value = Some(marker_value);
                    field.kind = FieldKind::Text;
                    changed = true;
                }
                None => {
                    // Front position: host UIs display the first custom field.
                    item.fields.insert(
                        0,
                        Field {
                            name: self.marker.field_name.clone(),
                            value: Some(marker_value),
                            kind: FieldKind::Text,
                        },
                    );
                    changed = true;
                }
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuthState, Credential, LoginData, VaultStatus};
    use crate::prompt::CredentialPrompt;
    use crate::session::SessionOptions;
    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::new(MarkerConfig::default())
    }

    fn login_item(id: &str, uris: Vec<UriEntry>) -> VaultItem {
        VaultItem {
            id: id.into(),
            name: format!("login {id}"),
            fields: Vec::new(),
            login: Some(LoginData {
                uris,
                rest: Default::default(),
            }),
            rest: Default::default(),
        }
    }

    fn note_item(id: &str, fields: Vec<Field>) -> VaultItem {
        VaultItem {
            id: id.into(),
            name: format!("note {id}"),
            fields,
            login: None,
            rest: Default::default(),
        }
    }

    fn uri(value: &str) -> UriEntry {
        UriEntry {
            uri: value.into(),
            match_type: None,
        }
    }

    fn text_field(name: &str, value: &str) -> Field {
        Field {
            name: name.into(),
            value: Some(value.into()),
            kind: FieldKind::Text,
        }
    }

    #[test]
    fn login_item_without_uris_gets_an_appended_marker() {
        let mut item = login_item("i1", vec![]);

        assert!(engine().apply_marker(&mut item));

        let uris = &item.login.as_ref().unwrap().uris;
        assert_eq!(uris.len(), 1);
        assert_eq!(uris[0].uri, "vaultlink:i1");
        assert_eq!(uris[0].match_type, Some(UriMatchType::Never));
    }

    #[test]
    fn marker_uri_is_appended_after_user_authored_entries() {
        let mut item = login_item("i1", vec![uri("https://example.com")]);

        assert!(engine().apply_marker(&mut item));

        let uris = &item.login.as_ref().unwrap().uris;
        assert_eq!(uris[0].uri, "https://example.com");
        assert_eq!(uris[1].uri, "vaultlink:i1");
    }

    #[test]
    fn non_login_marker_field_is_inserted_at_the_front() {
        let mut item = note_item("i2", vec![text_field("foo", "bar")]);

        assert!(engine().apply_marker(&mut item));

        assert_eq!(item.fields.len(), 2);
        assert_eq!(item.fields[0].name, "vaultlink-id");
        assert_eq!(item.fields[0].value.as_deref(), Some("vaultlink:i2"));
        assert_eq!(item.fields[0].kind, FieldKind::Text);
        assert_eq!(item.fields[1].name, "foo");
    }

    #[test]
    fn already_tagged_items_are_untouched() {
        let mut login = login_item("i3", vec![uri("vaultlink:i3")]);
        let mut note = note_item("i4", vec![text_field("vaultlink-id", "vaultlink:i4")]);
        let login_before = login.clone();
        let note_before = note.clone();

        assert!(!engine().apply_marker(&mut login));
        assert!(!engine().apply_marker(&mut note));
        assert_eq!(login, login_before);
        assert_eq!(note, note_before);
    }

    #[test]
    fn scheme_and_id_comparison_is_case_insensitive() {
        let mut item = login_item("AbCd", vec![uri("VaultLink:aBcD")]);
        assert!(!engine().apply_marker(&mut item));
    }

    #[test]
    fn marker_pointing_at_a_different_id_is_corrected_in_place() {
        let mut item = login_item(
            "i5",
            vec![
                uri("https://example.com"),
                uri("vaultlink:stale-id"),
                uri("https://other.example"),
            ],
        );

        assert!(engine().apply_marker(&mut item));

        let uris = &item.login.as_ref().unwrap().uris;
        assert_eq!(uris.len(), 3);
        assert_eq!(uris[1].uri, "vaultlink:i5");
        assert_eq!(uris[1].match_type, Some(UriMatchType::Never));
        assert_eq!(uris[0].uri, "https://example.com");
        assert_eq!(uris[2].uri, "https://other.example");
    }

    #[test]
    fn corrupt_marker_field_keeps_its_position() {
        let mut item = note_item(
            "i6",
            vec![
                text_field("first", "1"),
                text_field("vaultlink-id", "vaultlink:wrong"),
            ],
        );

        assert!(engine().apply_marker(&mut item));

        assert_eq!(item.fields.len(), 2);
        assert_eq!(item.fields[1].value.as_deref(), Some("vaultlink:i6"));
    }

    #[test]
    fn stray_marker_field_on_a_login_item_is_removed() {
        let mut item = login_item("i7", vec![uri("vaultlink:i7")]);
        item.fields
            .push(text_field("vaultlink-id", "vaultlink:i7"));

        assert!(engine().apply_marker(&mut item));

        assert!(item.fields.is_empty());
        assert_eq!(item.login.as_ref().unwrap().uris.len(), 1);
    }

    #[test]
    fn apply_marker_is_idempotent() {
        let mut login = login_item("i8", vec![uri("https://example.com")]);
        let mut note = note_item("i9", vec![text_field("foo", "bar")]);

        assert!(engine().apply_marker(&mut login));
        assert!(engine().apply_marker(&mut note));
        assert!(!engine().apply_marker(&mut login));
        assert!(!engine().apply_marker(&mut note));
    }

    // Fakes for driving the full pass through a session controller.

    struct StoreApi {
        items: RefCell<Vec<VaultItem>>,
        fetch_fails: bool,
        puts_allowed: Option<usize>,
        puts: Cell<usize>,
    }

    impl StoreApi {
        fn with_items(items: Vec<VaultItem>) -> Self {
            Self {
                items: RefCell::new(items),
                fetch_fails: false,
                puts_allowed: None,
                puts: Cell::new(0),
            }
        }
    }

    impl VaultApi for StoreApi {
        fn status(&self) -> crate::error::Result<VaultStatus> {
            let mut status = VaultStatus::unauthenticated();
            status.state = AuthState::Unlocked;
            Ok(status)
        }

        fn login(&self, _email: &str, _password: &str) -> crate::error::Result<Option<String>> {
            Ok(None)
        }

        fn unlock(&self, _password: &str) -> crate::error::Result<bool> {
            Ok(true)
        }

        fn lock(&self) -> crate::error::Result<bool> {
            Ok(true)
        }

        fn sync(&self) -> crate::error::Result<bool> {
            Ok(true)
        }

        fn items(&self) -> crate::error::Result<Option<Vec<VaultItem>>> {
            if self.fetch_fails {
                return Ok(None);
            }
            Ok(Some(self.items.borrow().clone()))
        }

        fn item(&self, id: &str) -> crate::error::Result<Option<VaultItem>> {
            Ok(self.items.borrow().iter().find(|i| i.id == id).cloned())
        }

        fn put_item(&self, item: &VaultItem) -> crate::error::Result<bool> {
            if let Some(allowed) = self.puts_allowed {
                if self.puts.get() >= allowed {
                    return Ok(false);
                }
            }
            self.puts.set(self.puts.get() + 1);
            let mut items = self.items.borrow_mut();
            if let Some(stored) = items.iter_mut().find(|i| i.id == item.id) {
                *stored = item.clone();
            }
            Ok(true)
        }

        fn totp(&self, _id: &str) -> crate::error::Result<Option<String>> {
            Ok(None)
        }

        fn logout(&self) -> crate::error::Result<bool> {
            Ok(true)
        }
    }

    struct StubServer {
        attached: bool,
    }

    impl VaultServer for StubServer {
        fn exists(&self) -> bool {
            true
        }

        fn start(&mut self, _session_token: Option<&str>) -> bool {
            self.attached = true;
            true
        }

        fn kill(&mut self) {
            self.attached = false;
        }

        fn is_attached(&self) -> bool {
            self.attached
        }

        fn logout_best_effort(&mut self) {}
    }

    struct NeverPrompt;

    impl CredentialPrompt for NeverPrompt {
        fn prompt(&mut self, _seed_email: Option<&str>) -> Option<Credential> {
            panic!("the unlocked fake vault must not prompt");
        }
    }

    struct RecordedProgress(Vec<f64>);

    impl ProgressReporter for RecordedProgress {
        fn report(&mut self, fraction: f64) {
            self.0.push(fraction);
        }
    }

    fn session_over(api: StoreApi) -> SessionController<StoreApi, StubServer> {
        SessionController::new(
            api,
            StubServer { attached: false },
            Box::new(NeverPrompt),
            SessionOptions {
                app_data_dir: PathBuf::from("/nonexistent/vaultlink-test-appdata"),
                auto_lock: true,
            },
        )
    }

    fn sample_items() -> Vec<VaultItem> {
        vec![
            login_item("i1", vec![]),
            note_item("i2", vec![text_field("foo", "bar")]),
            login_item("i3", vec![uri("vaultlink:i3")]),
        ]
    }

    #[test]
    fn full_pass_tags_everything_and_resolves_the_target() {
        let api = StoreApi::with_items(sample_items());
        let mut session = session_over(api);
        let mut progress = RecordedProgress(Vec::new());

        let outcome = engine()
            .tag_all_items(&mut session, "i2", &mut progress)
            .unwrap();

        assert_eq!(outcome.changed, 2);
        let matched = outcome.matched.unwrap();
        assert_eq!(matched.id, "i2");
        assert_eq!(matched.fields[0].value.as_deref(), Some("vaultlink:i2"));
        assert_eq!(progress.0.last().copied(), Some(1.0));
        assert!(progress.0.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn second_pass_changes_nothing() {
        let api = StoreApi::with_items(sample_items());
        let mut session = session_over(api);

        let first = engine()
            .tag_all_items(&mut session, "i1", &mut crate::progress::NullProgress)
            .unwrap();
        let second = engine()
            .tag_all_items(&mut session, "i1", &mut crate::progress::NullProgress)
            .unwrap();

        assert_eq!(first.changed, 2);
        assert_eq!(second.changed, 0);
        assert!(second.matched.is_some());
    }

    #[test]
    fn an_already_tagged_target_still_resolves() {
        let api = StoreApi::with_items(sample_items());
        let mut session = session_over(api);

        let outcome = engine()
            .tag_all_items(&mut session, "i3", &mut crate::progress::NullProgress)
            .unwrap();

        assert_eq!(outcome.matched.unwrap().id, "i3");
    }

    #[test]
    fn soft_failed_fetch_yields_an_empty_outcome() {
        let mut api = StoreApi::with_items(sample_items());
        api.fetch_fails = true;
        let mut session = session_over(api);

        let outcome = engine()
            .tag_all_items(&mut session, "i1", &mut crate::progress::NullProgress)
            .unwrap();

        assert!(outcome.matched.is_none());
        assert_eq!(outcome.changed, 0);
    }

    #[test]
    fn a_failed_item_push_aborts_the_rest_of_the_pass() {
        let mut api = StoreApi::with_items(sample_items());
        api.puts_allowed = Some(1);
        let mut session = session_over(api);

        let result = engine().tag_all_items(&mut session, "i1", &mut crate::progress::NullProgress);

        assert!(matches!(result, Err(Error::Rejected(_))));
    }
}
