use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::version::{self, GameVersion};
use crate::{Candidate, ProviderAdapter, ProviderError, ProviderType, VersionDescriptor};

/// What a scripted resolution does besides succeeding.
#[derive(Debug, Clone)]
enum Behavior {
    Fail(ProviderError),
    Delay(Duration),
    Panic,
}

#[derive(Debug, Default)]
struct Script {
    versions: Vec<String>,
    behaviors: HashMap<String, Behavior>,
    default_delay: Option<Duration>,
    list_error: Option<ProviderError>,
}

/// In-memory adapter for testing. The upstream version list and per-version
/// behavior can be changed between runs through `&self`.
pub struct ScriptedProvider {
    provider_type: ProviderType,
    minimum: Option<GameVersion>,
    script: Mutex<Script>,
    resolve_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            minimum: None,
            script: Mutex::new(Script::default()),
            resolve_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_versions(self, versions: &[&str]) -> Self {
        self.set_versions(versions);
        self
    }

    pub fn with_minimum(mut self, minimum: &str) -> Self {
        self.minimum = GameVersion::parse(minimum);
        self
    }

    /// Replace the version list upstream reports.
    pub fn set_versions(&self, versions: &[&str]) {
        let mut script = self.script.lock().unwrap();
        script.versions = versions.iter().map(|v| (*v).to_owned()).collect();
    }

    pub fn fail(&self, version: &str, error: ProviderError) {
        self.set_behavior(version, Behavior::Fail(error));
    }

    pub fn delay(&self, version: &str, delay: Duration) {
        self.set_behavior(version, Behavior::Delay(delay));
    }

    pub fn panic_on(&self, version: &str) {
        self.set_behavior(version, Behavior::Panic);
    }

    pub fn delay_all(&self, delay: Duration) {
        self.script.lock().unwrap().default_delay = Some(delay);
    }

    pub fn fail_listing(&self, error: ProviderError) {
        self.script.lock().unwrap().list_error = Some(error);
    }

    /// Drop all scripted failures and delays.
    pub fn reset_behaviors(&self) {
        let mut script = self.script.lock().unwrap();
        script.behaviors.clear();
        script.default_delay = None;
        script.list_error = None;
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    /// Highest number of resolutions observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn download_url(provider_type: ProviderType, version: &str) -> String {
        format!("https://downloads.test/{provider_type}/{version}/server.jar")
    }

    fn set_behavior(&self, version: &str, behavior: Behavior) {
        let mut script = self.script.lock().unwrap();
        script.behaviors.insert(version.to_owned(), behavior);
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>, ProviderError> {
        let script = self.script.lock().unwrap();
        if let Some(error) = &script.list_error {
            return Err(error.clone());
        }

        Ok(script
            .versions
            .iter()
            .filter(|v| version::meets_minimum(v, self.minimum.as_ref()))
            .map(|v| Candidate::new(v.clone(), format!("https://upstream.test/{v}")))
            .collect())
    }

    async fn resolve_detail(
        &self,
        candidate: &Candidate,
    ) -> Result<VersionDescriptor, ProviderError> {
        let behavior = {
            let script = self.script.lock().unwrap();
            script
                .behaviors
                .get(&candidate.version)
                .cloned()
                .or(script.default_delay.map(Behavior::Delay))
        };

        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        match behavior {
            Some(Behavior::Fail(error)) => return Err(error),
            Some(Behavior::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(Behavior::Panic) => panic!("scripted panic for {}", candidate.version),
            None => {}
        }

        Ok(VersionDescriptor::resolved(
            self.provider_type,
            candidate.version.clone(),
            Self::download_url(self.provider_type, &candidate.version),
        )
        .with_stable(candidate.stable))
    }
}
