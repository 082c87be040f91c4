use serde_yaml::Value;

const SERVICE_REPOS_KEY: &str = "serviceRepos";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("registry is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("registry top-level value must be a mapping")]
    NotAMapping,
    #[error("registry is missing required key 'serviceRepos'")]
    MissingServiceRepos,
    #[error("registry key 'serviceRepos' must map service names to their config")]
    ServiceReposNotAMapping,
    #[error("registry key 'serviceRepos' contains a non-string service name: {0}")]
    InvalidServiceName(String),
}

pub fn resolve_catalog(registry: &[u8]) -> Result<Vec<String>, CatalogError> {
    let document: Value = serde_yaml::from_slice(registry)?;
    let Value::Mapping(root) = document else {
        return Err(CatalogError::NotAMapping);
    };
    let repos = root
        .get(SERVICE_REPOS_KEY)
        .ok_or(CatalogError::MissingServiceRepos)?;
    let Value::Mapping(repos) = repos else {
        return Err(CatalogError::ServiceReposNotAMapping);
    };

    repos
        .keys()
        .map(|key| match key {
            Value::String(name) => Ok(name.clone()),
            other => Err(CatalogError::InvalidServiceName(
                serde_yaml::to_string(other)
                    .map(|rendered| rendered.trim().to_string())
                    .unwrap_or_else(|_| format!("{other:?}")),
            )),
        })
        .collect()
}
