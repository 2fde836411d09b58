// Request assembly: codec selection per module, query-arg emission, URL
// post-processing, and the hard URL-length budget.
//
// Each module of a batch is routed to the id codec when the server's id
// map can resolve it, otherwise into the folded trie.  The server
// re-assembles the positioned list from both args.  A URL over budget is
// bisected at the module-list midpoint and rebuilt as two independent
// requests, bottoming out at single-module requests.

use log::{debug, warn};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::error::CodecError;
use crate::features::{self, CookieStore, FeatureSet};
use crate::idlist::IdListBuilder;
use crate::module::{ModuleIdMap, ModuleRequest};
use crate::trie::{FoldedTrie, text};

/// Default URL-length budget.  4k minus headroom; 0 disables the check.
pub const DEFAULT_MAX_URL_LENGTH: usize = 4000;

/// Budget for legacy browsers whose caches ignore long request URLs.
pub const LEGACY_MAX_URL_LENGTH: usize = 2000;

/// `encodeURIComponent`'s unreserved set: what the server-side arg
/// parser expects to stay literal.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A URL post-processor: takes the URL built so far and the batch's
/// modules, returns the updated URL.  Run in caller-supplied order.
pub type UrlProcessor = Box<dyn Fn(String, &[ModuleRequest]) -> String>;

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Per-request accumulation state, owned by the caller.  Consumed by
/// [`RequestBuilder::build`], so state from one logical batch cannot
/// leak into the next.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub modules: Vec<ModuleRequest>,
    pub features: FeatureSet,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, module: impl Into<ModuleRequest>) -> &mut Self {
        self.modules.push(module.into());
        self
    }

    pub fn set_feature(&mut self, name: impl Into<String>, value: bool) -> &mut Self {
        self.features.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn reset(&mut self) {
        self.modules.clear();
        self.features.clear();
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct RequestBuilder {
    context_path: String,
    max_url_length: usize,
    id_map: Option<ModuleIdMap>,
    canonical_features: Option<Vec<String>>,
    boot_layer_deps: Vec<ModuleRequest>,
    cookie_store: Option<Box<dyn CookieStore>>,
    processors: Vec<UrlProcessor>,
    i18n_split: Option<Box<dyn Fn(&ModuleRequest) -> bool>>,
}

impl RequestBuilder {
    pub fn new(context_path: impl Into<String>) -> Self {
        Self {
            context_path: context_path.into(),
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            id_map: None,
            canonical_features: None,
            boot_layer_deps: Vec::new(),
            cookie_store: None,
            processors: Vec::new(),
            i18n_split: None,
        }
    }

    /// URL-length budget; 0 disables splitting.
    pub fn max_url_length(mut self, max: usize) -> Self {
        self.max_url_length = max;
        self
    }

    /// Server-assigned id map enabling the id codec.
    pub fn id_map(mut self, map: ModuleIdMap) -> Self {
        self.id_map = Some(map);
        self
    }

    /// Canonical feature list enabling the trit-packed `hasEnc=` arg.
    pub fn canonical_features(mut self, list: Vec<String>) -> Self {
        self.canonical_features = Some(list);
        self
    }

    /// Bootstrap/expansion-layer dependencies, sent as
    /// `reqExpEx=`/`reqExpExIds=` on every request.
    pub fn boot_layer_deps(mut self, deps: Vec<ModuleRequest>) -> Self {
        self.boot_layer_deps = deps;
        self
    }

    /// Cookie store enabling the `hashhash=` feature side channel.
    pub fn cookie_store(mut self, store: Box<dyn CookieStore>) -> Self {
        self.cookie_store = Some(store);
        self
    }

    /// Append a URL post-processor; processors run in push order.
    pub fn post_processor(mut self, processor: UrlProcessor) -> Self {
        self.processors.push(processor);
        self
    }

    /// Enable pre-partitioning of mixed batches into i18n-resource and
    /// ordinary requests, classified by the predicate.
    pub fn i18n_split(mut self, is_i18n: impl Fn(&ModuleRequest) -> bool + 'static) -> Self {
        self.i18n_split = Some(Box::new(is_i18n));
        self
    }

    /// Build the request URL(s) for a batch.  Returns more than one URL
    /// when the i18n pre-partition or the length budget splits it.
    pub fn build(&mut self, batch: Batch) -> Result<Vec<String>, CodecError> {
        let Batch { modules, features } = batch;

        // The feature arg (and any cookie write) happens once per batch,
        // not once per split sub-request.
        let feature_arg = features::query_arg(
            &features,
            self.canonical_features.as_deref(),
            self.cookie_store.as_deref_mut(),
            &self.context_path,
        )?;

        let mut urls = Vec::new();
        if let Some(is_i18n) = &self.i18n_split {
            let (i18n, ordinary): (Vec<ModuleRequest>, Vec<ModuleRequest>) =
                modules.iter().cloned().partition(|m| is_i18n(m));
            if !i18n.is_empty() && !ordinary.is_empty() {
                debug!(
                    "mixed batch: splitting into {} ordinary and {} i18n modules",
                    ordinary.len(),
                    i18n.len()
                );
                self.build_into(&ordinary, &feature_arg, &mut urls)?;
                self.build_into(&i18n, &feature_arg, &mut urls)?;
                return Ok(urls);
            }
        }
        self.build_into(&modules, &feature_arg, &mut urls)?;
        Ok(urls)
    }

    fn build_into(
        &self,
        modules: &[ModuleRequest],
        feature_arg: &Option<(&'static str, String)>,
        urls: &mut Vec<String>,
    ) -> Result<(), CodecError> {
        let url = self.build_url(modules, feature_arg)?;
        if self.max_url_length > 0 && url.len() > self.max_url_length && modules.len() > 1 {
            let mid = modules.len() / 2;
            debug!(
                "url length {} exceeds budget {}; splitting {} modules at {}",
                url.len(),
                self.max_url_length,
                modules.len(),
                mid
            );
            self.build_into(&modules[..mid], feature_arg, urls)?;
            return self.build_into(&modules[mid..], feature_arg, urls);
        }
        if self.max_url_length > 0 && url.len() > self.max_url_length {
            warn!(
                "single-module request still exceeds url budget ({} > {})",
                url.len(),
                self.max_url_length
            );
        }
        urls.push(url);
        Ok(())
    }

    fn build_url(
        &self,
        modules: &[ModuleRequest],
        feature_arg: &Option<(&'static str, String)>,
    ) -> Result<String, CodecError> {
        let mut url = self.context_path.clone();
        url = self.add_modules(url, ("modules", "moduleIds"), modules, true, true)?;
        if !self.boot_layer_deps.is_empty() {
            url = self.add_modules(
                url,
                ("reqExpEx", "reqExpExIds"),
                &self.boot_layer_deps,
                false,
                false,
            )?;
        }
        if let Some((key, value)) = feature_arg {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        for processor in &self.processors {
            url = processor(url, modules);
        }
        Ok(url)
    }

    /// Route each module to the id codec or the path folder and emit the
    /// pair of query args.  The id arg is emitted even when empty if the
    /// hash token rides along, so the server can validate the client's
    /// id map version.
    fn add_modules(
        &self,
        mut url: String,
        arg_names: (&str, &str),
        modules: &[ModuleRequest],
        with_hash: bool,
        include_count: bool,
    ) -> Result<String, CodecError> {
        let mut ids = IdListBuilder::default();
        let mut trie = FoldedTrie::default();
        for (i, module) in modules.iter().enumerate() {
            module.validate()?;
            let id_encoded = match &self.id_map {
                Some(map) => ids.try_add(module, i as u32, map),
                None => false,
            };
            if !id_encoded {
                trie.insert(module, i as u32)?;
            }
        }

        if include_count {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&format!("count={}", modules.len()));
        }
        if !trie.is_empty() {
            let encoded = text::encode(&trie);
            url.push_str(&format!(
                "&{}={}",
                arg_names.0,
                utf8_percent_encode(&encoded, COMPONENT)
            ));
        }
        let hash = if with_hash {
            self.id_map.as_ref().map(|map| map.hash())
        } else {
            None
        };
        if !ids.is_empty() || hash.is_some() {
            url.push_str(&format!("&{}={}", arg_names.1, ids.finish(hash)));
        }
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// Built-in post-processors
// ---------------------------------------------------------------------------

/// Appends the cache-bust token as `cb=`.
pub fn cache_bust_processor(token: impl Into<String>) -> UrlProcessor {
    let token = token.into();
    Box::new(move |mut url, _modules| {
        url.push_str("&cb=");
        url.push_str(&token);
        url
    })
}

/// Appends the locale list as `locs=`, but only when the request
/// contains at least one i18n resource per the predicate, and only when
/// no `locs=` arg is present yet.
pub fn locale_processor(
    locales: Vec<String>,
    is_i18n: impl Fn(&ModuleRequest) -> bool + 'static,
) -> UrlProcessor {
    Box::new(move |mut url, modules| {
        if modules.iter().any(&is_i18n) && !url.contains("&locs=") && !url.contains("?locs=") {
            url.push_str("&locs=");
            url.push_str(&locales.join(","));
        }
        url
    })
}

/// Appends a fixed set of configuration args (e.g. `en=true`,
/// `opt=simple`) to every request.
pub fn static_args_processor(args: Vec<(String, String)>) -> UrlProcessor {
    Box::new(move |mut url, _modules| {
        for (key, value) in &args {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        url
    })
}
