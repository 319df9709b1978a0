//! The authenticated pipeline entry point.
//!
//! `execute` runs the full control flow: attach the stored bearer credential,
//! dispatch, classify any failure, and — for an unauthorized response caused
//! by a decodably expired credential — go through the refresh coordinator and
//! replay the original request once with the new credential.

use std::sync::Arc;
use std::time::SystemTime;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::dispatch::{self, PipelineResponse};
use crate::errors::Error;
use crate::refresh::RefreshCoordinator;
use crate::request_context::RequestContext;
use crate::session::{NavigateFn, SessionTeardown};
use crate::store::CredentialStore;
use crate::token::{self, CredentialPair};

pub struct AuthClient {
    http: Client,
    config: Config,
    store: Arc<dyn CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthClient {
    /// Builds a client over an injected credential store and navigation
    /// effect. One coordinator per client, so independent API bases refresh
    /// independently.
    pub fn new(
        config: Config,
        store: Arc<dyn CredentialStore>,
        navigate: NavigateFn,
    ) -> Result<Self, Error> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        let teardown = Arc::new(SessionTeardown::new(
            store.clone(),
            config.access_key.clone(),
            config.refresh_key.clone(),
            navigate,
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            teardown,
            config.access_key.clone(),
            config.refresh_key.clone(),
            config.refresh_timeout(),
        ));
        Ok(Self {
            http,
            config,
            store,
            coordinator,
        })
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dispatches the request, running its lifecycle hooks around the whole
    /// attempt (including any refresh-and-replay).
    pub async fn execute(&self, ctx: RequestContext) -> Result<PipelineResponse, Error> {
        if let Some(hook) = &ctx.before_send {
            hook();
        }
        let result = self.execute_inner(&ctx).await;
        if let Some(hook) = &ctx.complete_send {
            hook();
        }
        result
    }

    async fn execute_inner(&self, ctx: &RequestContext) -> Result<PipelineResponse, Error> {
        // Outbound interceptor: a missing credential is a valid anonymous
        // request, not an error.
        let bearer = self.store.get(&self.config.access_key);
        let failure =
            match dispatch::dispatch(&self.http, &self.config.base_url, ctx, bearer.as_deref())
                .await
            {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };

        // Inbound interceptor. Expiry is only checked reactively, after the
        // server has rejected the call: the server's clock is authoritative
        // for every status except the one case we can confirm locally.
        if !failure.is_unauthorized() {
            return Err(failure);
        }
        let Some(access) = self.store.get(&self.config.access_key) else {
            return Err(failure);
        };
        if !token::is_expired(&access, SystemTime::now()) {
            debug!(target = %ctx.target, "unauthorized but credential not expired; passing through");
            return Err(failure);
        }

        warn!(target = %ctx.target, "credential expired; entering refresh");
        match self
            .coordinator
            .refresh_or_wait(|refresh_credential| self.refresh_call(refresh_credential))
            .await
        {
            Ok(access) => {
                dispatch::dispatch(&self.http, &self.config.base_url, ctx, Some(&access)).await
            }
            // Nothing to refresh with: the caller gets its original failure,
            // no retry attempted.
            Err(Error::MissingRefreshCredential) => Err(failure),
            Err(refresh_err) => Err(refresh_err),
        }
    }

    /// The single refresh call of an expiry cycle, dispatched by whichever
    /// caller the coordinator elects as driver.
    async fn refresh_call(&self, refresh_credential: String) -> Result<CredentialPair, Error> {
        let resp = self
            .http
            .get(self.config.refresh_url())
            .query(&[(self.config.refresh_key.as_str(), refresh_credential.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status(status, body));
        }
        let payload: Value = resp.json().await?;
        CredentialPair::from_payload(&payload, &self.config.access_key, &self.config.refresh_key)
    }
}
