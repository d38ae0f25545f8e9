use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;

/// Resources shared across every executor instance created for one runner
/// batch. Built once per batch from a pre-scan of the kinds present, rather
/// than per-check, so a batch of a thousand HTTP checks shares one pooled
/// client instead of opening a thousand connection pools.
#[derive(Clone)]
pub struct SharedResources {
    http_client: Option<reqwest::Client>,
    resolver: Option<TokioAsyncResolver>,
}

impl SharedResources {
    pub fn builder() -> SharedResourcesBuilder {
        SharedResourcesBuilder::default()
    }

    pub fn http_client(&self) -> reqwest::Client {
        self.http_client.clone().unwrap_or_else(build_default_http_client)
    }

    pub fn resolver(&self) -> TokioAsyncResolver {
        self.resolver.clone().unwrap_or_else(build_default_resolver)
    }
}

fn build_default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("default http client configuration is always valid")
}

fn build_default_resolver() -> TokioAsyncResolver {
    TokioAsyncResolver::tokio_from_system_conf()
        .unwrap_or_else(|_| TokioAsyncResolver::tokio(Default::default(), Default::default()))
}

#[derive(Default)]
pub struct SharedResourcesBuilder {
    need_http: bool,
    need_dns: bool,
}

impl SharedResourcesBuilder {
    pub fn need_http(mut self) -> Self {
        self.need_http = true;
        self
    }

    pub fn need_dns(mut self) -> Self {
        self.need_dns = true;
        self
    }

    pub fn build(self) -> SharedResources {
        SharedResources {
            http_client: self.need_http.then(build_default_http_client),
            resolver: self.need_dns.then(build_default_resolver),
        }
    }
}
