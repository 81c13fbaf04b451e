use std::path::Path;
use std::str::FromStr as _;
use std::time::Duration;

use anyhow::Context as _;
use rampload_core::presets::{self, TestPlan};
use rampload_core::{BodyEncoding, BodyFields, HttpMethod, RequestSpec};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScenarioYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// constant-vus | ramping-vus | ramping-arrival-rate | constant-arrival-rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<YamlDuration>,

    // ramping-vus
    #[serde(rename = "startVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<u64>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stages: Vec<StageYaml>,

    // arrival rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_rate: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_unit: Option<YamlDuration>,

    #[serde(rename = "preAllocatedVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_allocated_vus: Option<u64>,

    #[serde(rename = "maxVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vus: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StageYaml {
    pub target: u64,

    #[serde(default)]
    pub duration: YamlDuration,
}

/// The request each iteration sends. `url` wins over `baseUrl` + `path`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RequestYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(
        skip_serializing_if = "Vec::is_empty",
        default,
        serialize_with = "serialize_pairs",
        deserialize_with = "deserialize_scalar_pairs"
    )]
    pub headers: Vec<(String, String)>,

    /// json | form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout: Option<YamlDuration>,

    #[serde(
        skip_serializing_if = "Vec::is_empty",
        default,
        serialize_with = "serialize_pairs",
        deserialize_with = "deserialize_scalar_pairs"
    )]
    pub body: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 15m), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioDocYamlNested {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    request: Option<RequestYaml>,
    scenario: ScenarioYaml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioDocYamlFlat {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    request: Option<RequestYaml>,
    #[serde(flatten)]
    scenario: ScenarioYaml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScenarioDocYamlMulti {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request: Option<RequestYaml>,

    pub scenarios: Vec<ScenarioYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScenarioDocYaml {
    Multi(ScenarioDocYamlMulti),
    Nested(ScenarioDocYamlNested),
    Flat(ScenarioDocYamlFlat),
}

fn yaml_scalar(v: serde_yaml::Value) -> Option<Option<String>> {
    match v {
        serde_yaml::Value::Null => Some(None),
        serde_yaml::Value::Bool(b) => Some(Some(b.to_string())),
        serde_yaml::Value::Number(n) => Some(Some(n.to_string())),
        serde_yaml::Value::String(s) => Some(Some(s)),
        _ => None,
    }
}

/// A flat mapping of scalars, in document order. `null` values are skipped.
fn deserialize_scalar_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_yaml::Mapping::deserialize(deserializer)?;
    let mut out: Vec<(String, String)> = Vec::with_capacity(raw.len());

    for (k, v) in raw {
        let Some(Some(key)) = yaml_scalar(k) else {
            return Err(serde::de::Error::custom("keys must be strings"));
        };
        let value = yaml_scalar(v).ok_or_else(|| {
            serde::de::Error::custom(format!("`{key}` must be a string, number or bool"))
        })?;
        if let Some(value) = value {
            out.push((key, value));
        }
    }

    Ok(out)
}

fn serialize_pairs<S>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap as _;

    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (k, v) in pairs {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

/// A parsed scenario file, before the target URL is known.
#[derive(Debug, Clone)]
pub(crate) struct ScenarioFile {
    pub base_url: Option<String>,
    pub request: Option<RequestYaml>,
    pub options: rampload_core::LoadOptions,
}

impl ScenarioFile {
    /// `base_url_override` (from the CLI) beats the file's `baseUrl`, which beats the default.
    pub(crate) fn into_plan(self, base_url_override: Option<&str>) -> anyhow::Result<TestPlan> {
        let base_url = base_url_override
            .or(self.base_url.as_deref())
            .unwrap_or(presets::DEFAULT_BASE_URL);

        let request = match self.request {
            None => presets::register_user_request(base_url),
            Some(r) => request_from_yaml(r, base_url)?,
        };
        request.validate()?;

        Ok(TestPlan {
            options: self.options,
            request,
        })
    }
}

fn request_from_yaml(r: RequestYaml, base_url: &str) -> anyhow::Result<RequestSpec> {
    let method = match r.method.as_deref() {
        Some(m) => HttpMethod::from_str(m)
            .map_err(|_| rampload_core::Error::InvalidMethod(m.to_string()))?,
        None => HttpMethod::default(),
    };
    let encoding = match r.encoding.as_deref() {
        Some(e) => BodyEncoding::from_str(e)
            .map_err(|_| rampload_core::Error::InvalidEncoding(e.to_string()))?,
        None => BodyEncoding::default(),
    };
    let url = match (r.url, r.path) {
        (Some(url), _) => url,
        (None, path) => rampload_core::join_url(
            base_url,
            path.as_deref().unwrap_or(presets::USER_REGISTER_PATH),
        ),
    };

    let mut spec = RequestSpec::new(method, url).with_encoding(encoding);
    spec.headers = r.headers;
    spec.body = r.body.into_iter().collect::<BodyFields>();
    spec.timeout = r.timeout.map(YamlDuration::into_inner);
    Ok(spec)
}

pub(crate) fn looks_like_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase()),
        Some(ext) if ext == "yml" || ext == "yaml"
    )
}

pub(crate) fn parse_scenario_file(bytes: &[u8], path: &Path) -> anyhow::Result<ScenarioFile> {
    let doc: ScenarioDocYaml = serde_yaml::from_slice(bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    let (base_url, request, scenarios_yaml) = match doc {
        ScenarioDocYaml::Multi(d) => (d.base_url, d.request, d.scenarios),
        ScenarioDocYaml::Nested(d) => (d.base_url, d.request, vec![d.scenario]),
        ScenarioDocYaml::Flat(d) => (d.base_url, d.request, vec![d.scenario]),
    };

    let total = scenarios_yaml.len();
    let scenarios = scenarios_yaml
        .into_iter()
        .enumerate()
        .map(|(idx, scenario)| {
            let default_name = if total <= 1 {
                scenario
                    .name
                    .clone()
                    .or_else(|| {
                        path.file_stem()
                            .and_then(|s| s.to_str())
                            .map(|s| s.to_string())
                    })
                    .unwrap_or_else(|| "main".to_string())
            } else {
                format!("scenario_{}", idx + 1)
            };
            scenario_yaml_into_options(scenario, default_name)
        })
        .collect();

    Ok(ScenarioFile {
        base_url,
        request,
        options: rampload_core::LoadOptions {
            scenarios,
            ..rampload_core::LoadOptions::default()
        },
    })
}

pub(crate) async fn load_scenario_file(path: &Path) -> anyhow::Result<ScenarioFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario file: {}", path.display()))?;
    parse_scenario_file(&bytes, path)
}

fn scenario_yaml_into_options(
    scenario: ScenarioYaml,
    default_name: String,
) -> rampload_core::ScenarioOptions {
    let ScenarioYaml {
        name,
        executor,
        vus,
        iterations,
        duration,
        start_vus,
        stages,
        start_rate,
        rate,
        time_unit,
        pre_allocated_vus,
        max_vus,
    } = scenario;

    rampload_core::ScenarioOptions {
        name: name.unwrap_or(default_name),
        executor,
        vus,
        iterations,
        duration: duration.map(YamlDuration::into_inner),
        start_vus,
        stages: stages
            .into_iter()
            .map(|s| rampload_core::Stage {
                duration: s.duration.into_inner(),
                target: s.target,
            })
            .collect(),
        start_rate,
        rate,
        time_unit: time_unit.map(YamlDuration::into_inner),
        pre_allocated_vus,
        max_vus,
    }
}

fn stages_yaml(stages: &[rampload_core::Stage]) -> Vec<StageYaml> {
    stages
        .iter()
        .map(|st| StageYaml {
            duration: YamlDuration::from(st.duration),
            target: st.target,
        })
        .collect()
}

pub(crate) fn build_scenario_yaml(s: &rampload_core::ScenarioConfig) -> ScenarioYaml {
    let name = Some(s.name.clone());
    let executor = Some(s.executor.kind().to_string());

    match &s.executor {
        rampload_core::ScenarioExecutor::ConstantVus { vus } => ScenarioYaml {
            name,
            executor,
            vus: Some(*vus),
            iterations: s.iterations,
            duration: s.duration.map(YamlDuration::from),
            ..ScenarioYaml::default()
        },
        rampload_core::ScenarioExecutor::RampingVus { start_vus, stages } => ScenarioYaml {
            name,
            executor,
            start_vus: Some(*start_vus),
            stages: stages_yaml(stages),
            ..ScenarioYaml::default()
        },
        rampload_core::ScenarioExecutor::RampingArrivalRate {
            start_rate,
            time_unit,
            pre_allocated_vus,
            max_vus,
            stages,
        } => ScenarioYaml {
            name,
            executor,
            stages: stages_yaml(stages),
            start_rate: Some(*start_rate),
            time_unit: Some(YamlDuration::from(*time_unit)),
            pre_allocated_vus: Some(*pre_allocated_vus),
            max_vus: Some(*max_vus),
            ..ScenarioYaml::default()
        },
    }
}

fn build_request_yaml(req: &RequestSpec, base_url: &str) -> (Option<String>, RequestYaml) {
    let base = base_url.trim_end_matches('/');
    let (base_url, url, path) = match req.url.strip_prefix(base) {
        Some(path) if path.starts_with('/') => {
            (Some(base.to_string()), None, Some(path.to_string()))
        }
        _ => (None, Some(req.url.clone()), None),
    };

    let request = RequestYaml {
        method: Some(req.method.to_string()),
        url,
        path,
        headers: req.headers.clone(),
        encoding: Some(req.encoding.to_string()),
        timeout: req.timeout.map(YamlDuration::from),
        body: req
            .body
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    };
    (base_url, request)
}

pub(crate) fn build_doc_from_plan(
    scenarios: &[rampload_core::ScenarioConfig],
    request: &RequestSpec,
    base_url: &str,
) -> ScenarioDocYamlMulti {
    let (base_url, request) = build_request_yaml(request, base_url);
    ScenarioDocYamlMulti {
        base_url,
        request: Some(request),
        scenarios: scenarios.iter().map(build_scenario_yaml).collect(),
    }
}

pub(crate) async fn write_yaml_file<T: Serialize>(path: &Path, doc: &T) -> anyhow::Result<()> {
    let s = serde_yaml::to_string(doc).context("failed to serialize YAML")?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    tokio::fs::write(path, s)
        .await
        .with_context(|| format!("failed to write file: {}", path.display()))?;

    Ok(())
}
