//! Tool and resource catalog built from the registered services.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{JobBuildaError, Result};
use crate::services::{ResourceMatch, ResourceTemplate, ResourceUri, Service, Tool};

/// Routes tool names and resource URIs to their owning service
#[derive(Clone)]
pub struct Catalog {
    services: Vec<Arc<dyn Service>>,
    tools: HashMap<String, (Tool, Arc<dyn Service>)>,
    resources: Vec<(ResourceTemplate, Arc<dyn Service>)>,
}

impl Catalog {
    /// Build the catalog, rejecting a tool name claimed by two services.
    pub fn new(services: Vec<Arc<dyn Service>>) -> Result<Self> {
        let mut tools: HashMap<String, (Tool, Arc<dyn Service>)> = HashMap::new();
        let mut resources = Vec::new();

        for service in &services {
            for tool in service.tools() {
                if let Some((_, owner)) = tools.get(&tool.name) {
                    return Err(JobBuildaError::validation(format!(
                        "tool '{}' registered by both {} and {}",
                        tool.name,
                        owner.name(),
                        service.name()
                    )));
                }
                tools.insert(tool.name.clone(), (tool, Arc::clone(service)));
            }
            for template in service.resources() {
                resources.push((template, Arc::clone(service)));
            }
        }

        log::debug!(
            "Catalog: {} services, {} tools, {} resource templates",
            services.len(),
            tools.len(),
            resources.len()
        );
        Ok(Self {
            services,
            tools,
            resources,
        })
    }

    pub fn services(&self) -> &[Arc<dyn Service>] {
        &self.services
    }

    /// All tools, sorted by name
    pub fn tools(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().map(|(tool, _)| tool).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn resources(&self) -> Vec<&ResourceTemplate> {
        self.resources.iter().map(|(template, _)| template).collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools().into_iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// The service that owns a tool
    pub fn tool(&self, name: &str) -> Result<Arc<dyn Service>> {
        self.tools
            .get(name)
            .map(|(_, service)| Arc::clone(service))
            .ok_or_else(|| JobBuildaError::UnknownTool(name.to_string()))
    }

    /// Resolve a URI to the service and template that serve it.
    ///
    /// When several templates match, the one with the most literal
    /// segments wins.
    pub fn resolve(&self, raw: &str) -> Result<(Arc<dyn Service>, ResourceMatch)> {
        let uri = ResourceUri::parse(raw)?;
        self.resources
            .iter()
            .filter_map(|(template, service)| {
                uri.match_template(&template.uri_template)
                    .map(|params| (template, service, params))
            })
            .max_by_key(|(_, _, params)| uri.segments.len() - params.len())
            .map(|(template, service, params)| {
                (
                    Arc::clone(service),
                    ResourceMatch {
                        template: template.uri_template.clone(),
                        params,
                        uri: uri.clone(),
                    },
                )
            })
            .ok_or_else(|| JobBuildaError::UnknownResource(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestContext;
    use crate::services::test_support::deps;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Dummy {
        name: &'static str,
        tool: &'static str,
    }

    #[async_trait]
    impl Service for Dummy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn tools(&self) -> Vec<Tool> {
            vec![Tool::new(self.tool, "dummy")]
        }

        fn resources(&self) -> Vec<ResourceTemplate> {
            vec![
                ResourceTemplate::new("jobbuilda://things/{id}", "thing", "one thing"),
                ResourceTemplate::new("jobbuilda://things/latest", "latest", "newest thing"),
            ]
        }

        async fn read_resource(&self, _ctx: &RequestContext, resource: &ResourceMatch) -> Result<Value> {
            Ok(Value::String(resource.template.clone()))
        }

        async fn call_tool(&self, _ctx: &RequestContext, _name: &str, _arguments: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn dummy(name: &'static str, tool: &'static str) -> Arc<dyn Service> {
        Arc::new(Dummy { name, tool })
    }

    #[test]
    fn test_catalog_from_all_services() {
        let catalog = Catalog::new(crate::services::all(&deps())).unwrap();
        assert_eq!(catalog.services().len(), 7);
        assert!(!catalog.is_empty());
        for name in ["create_quote", "record_payment", "log_time", "complete_test", "generate_report"] {
            assert!(catalog.tool(name).is_ok(), "missing {}", name);
        }
        let names = catalog.tool_names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let err = Catalog::new(vec![dummy("one", "same"), dummy("two", "same")]).err().unwrap();
        assert!(err.to_string().contains("'same'"));
    }

    #[test]
    fn test_unknown_tool() {
        let catalog = Catalog::new(vec![dummy("one", "t")]).unwrap();
        assert!(matches!(catalog.tool("nope"), Err(JobBuildaError::UnknownTool(_))));
    }

    #[test]
    fn test_resolve_prefers_literal_segments() {
        let catalog = Catalog::new(vec![dummy("one", "t")]).unwrap();

        let (_, latest) = catalog.resolve("jobbuilda://things/latest").unwrap();
        assert_eq!(latest.template, "jobbuilda://things/latest");

        let (_, one) = catalog.resolve("jobbuilda://things/abc?x=1").unwrap();
        assert_eq!(one.template, "jobbuilda://things/{id}");
        assert_eq!(one.param("id").unwrap(), "abc");
        assert_eq!(one.query("x"), Some("1"));
    }

    #[test]
    fn test_resolve_unknown_resource() {
        let catalog = Catalog::new(crate::services::all(&deps())).unwrap();
        assert!(matches!(
            catalog.resolve("jobbuilda://nothing/here/at/all"),
            Err(JobBuildaError::UnknownResource(_))
        ));
        assert!(matches!(
            catalog.resolve("https://quotes"),
            Err(JobBuildaError::UnknownResource(_))
        ));
    }
}
