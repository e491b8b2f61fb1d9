//! Prefix-based routing of object keys to transformations

use crate::config::RouteConfig;
use crate::error::PipelineError;
use crate::models::{RoutingDecision, TransformationKind};

const METADATA_SUFFIX: &str = ".json";

/// Maps the leading prefix of an object key to exactly one transformation.
///
/// Routes are validated once on construction: no two input prefixes may overlap, no two output
/// prefixes may overlap, and no output prefix may fall under an input prefix (the artifact would
/// trigger the pipeline again). With overlaps ruled out the first matching route is the only one.
#[derive(Debug, Clone)]
pub struct PrefixRouter {
    routes: Vec<RouteConfig>,
}

impl PrefixRouter {
    pub fn new(routes: Vec<RouteConfig>) -> Result<Self, anyhow::Error> {
        if routes.is_empty() {
            return Err(anyhow::anyhow!("At least one route must be configured"));
        }

        for route in &routes {
            if route.prefix.is_empty() {
                return Err(anyhow::anyhow!("Route prefixes must not be empty"));
            }
            if route.output_prefix.is_empty() {
                return Err(anyhow::anyhow!(
                    "Route '{}' has an empty output prefix",
                    route.prefix
                ));
            }
        }

        for (i, a) in routes.iter().enumerate() {
            for b in routes.iter().skip(i + 1) {
                if a.prefix == b.prefix {
                    return Err(anyhow::anyhow!("Duplicate route prefix '{}'", a.prefix));
                }
                if overlaps(&a.prefix, &b.prefix) {
                    return Err(anyhow::anyhow!(
                        "Route prefixes '{}' and '{}' overlap",
                        a.prefix,
                        b.prefix
                    ));
                }
                // Two routes writing under the same prefix can overwrite each other's artifacts
                if overlaps(&a.output_prefix, &b.output_prefix) {
                    return Err(anyhow::anyhow!(
                        "Output prefixes '{}' (route '{}') and '{}' (route '{}') overlap",
                        a.output_prefix,
                        a.prefix,
                        b.output_prefix,
                        b.prefix
                    ));
                }
            }
        }

        for output in &routes {
            if let Some(input) = routes
                .iter()
                .find(|input| overlaps(&output.output_prefix, &input.prefix))
            {
                return Err(anyhow::anyhow!(
                    "Output prefix '{}' overlaps input prefix '{}'",
                    output.output_prefix,
                    input.prefix
                ));
            }
        }

        Ok(Self { routes })
    }

    pub fn route(&self, object_key: &str) -> Result<RoutingDecision, PipelineError> {
        let route = self
            .routes
            .iter()
            .find(|route| object_key.starts_with(&route.prefix))
            .ok_or_else(|| {
                PipelineError::UnroutableKey(format!("no route matches '{}'", object_key))
            })?;

        let remainder = &object_key[route.prefix.len()..];
        if remainder.is_empty() || object_key.ends_with('/') {
            return Err(PipelineError::UnroutableKey(format!(
                "'{}' is a directory marker, not an object",
                object_key
            )));
        }

        let mut output_key = format!("{}{}", route.output_prefix, remainder);
        if route.kind == TransformationKind::ExifExtract {
            output_key.push_str(METADATA_SUFFIX);
        }

        Ok(RoutingDecision {
            transformation_kind: route.kind,
            input_key: object_key.to_string(),
            output_prefix: route.output_prefix.clone(),
            output_key,
        })
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }
}

fn overlaps(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
