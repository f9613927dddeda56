use regex::Regex;

/// Decomposed image coordinates as observed in Kubernetes container status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: String,
    pub repo: String,
    pub tag: String,
    pub digest: String,
}

impl ImageRef {
    /// Reassembles the reference in the shape it was parsed from. A registry
    /// is only rendered when present; a digest renders as `@digest`, a tag as
    /// `:tag`.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        if !self.registry.is_empty() {
            out.push_str(&self.registry);
            out.push('/');
        }
        out.push_str(&self.repo);
        if !self.digest.is_empty() {
            out.push('@');
            out.push_str(&self.digest);
        } else if !self.tag.is_empty() {
            out.push(':');
            out.push_str(&self.tag);
        }
        out
    }
}

/// Breaks an image path into registry/repo/tag/digest coordinates. A registry
/// is recognized by a `.` appearing before the first `/`.
pub fn parse_image_path(image_path: &str) -> ImageRef {
    let mut parsed = ImageRef::default();

    let with_registry = Regex::new(r"^(.*\..*?)/(.*)@(.*)|^(.*\..*?)/(.*):(.*)")
        .expect("image path pattern must be valid");
    if let Some(m) = with_registry.captures(image_path) {
        if let Some(registry) = m.get(1) {
            // registry.com/repo@digest, no tag
            parsed.registry = registry.as_str().to_string();
            parsed.repo = m.get(2).map_or("", |v| v.as_str()).to_string();
            parsed.digest = m.get(3).map_or("", |v| v.as_str()).to_string();
        } else if let Some(registry) = m.get(4) {
            // registry.com/repo:tag
            parsed.registry = registry.as_str().to_string();
            parsed.repo = m.get(5).map_or("", |v| v.as_str()).to_string();
            parsed.tag = m.get(6).map_or("", |v| v.as_str()).to_string();
        }
        return parsed;
    }

    let repo_tag = Regex::new(r"^(.*):(.*)").expect("repo:tag pattern must be valid");
    if let Some(m) = repo_tag.captures(image_path) {
        // No registry listed, only repo:tag
        parsed.repo = m.get(1).map_or("", |v| v.as_str()).to_string();
        parsed.tag = m.get(2).map_or("", |v| v.as_str()).to_string();
        return parsed;
    }

    let registry_repo = Regex::new(r"^(.*\..*?)/(.*)").expect("registry/repo pattern must be valid");
    if let Some(m) = registry_repo.captures(image_path) {
        // Only registry/repo found, no tag
        parsed.registry = m.get(1).map_or("", |v| v.as_str()).to_string();
        parsed.repo = m.get(2).map_or("", |v| v.as_str()).to_string();
        return parsed;
    }

    parsed.repo = image_path.to_string();
    parsed
}

/// Pulls the content digest out of a Kubernetes `imageID` value, which comes
/// in as `docker-pullable://repo@sha256:...` or `docker://sha256:...`.
pub fn parse_image_digest(image_id: &str) -> Option<String> {
    let pullable = Regex::new(r"^docker.*@(.*)").expect("imageID pattern must be valid");
    if let Some(m) = pullable.captures(image_id) {
        return m.get(1).map(|v| v.as_str().to_string());
    }

    let local = Regex::new(r"^docker://(.*)").expect("imageID pattern must be valid");
    local
        .captures(image_id)
        .and_then(|m| m.get(1).map(|v| v.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_repo_digest() {
        let parsed = parse_image_path("registry.example.com/team/app@sha256:abc123");
        assert_eq!(parsed.registry, "registry.example.com");
        assert_eq!(parsed.repo, "team/app");
        assert_eq!(parsed.tag, "");
        assert_eq!(parsed.digest, "sha256:abc123");
    }

    #[test]
    fn parses_registry_repo_tag() {
        let parsed = parse_image_path("registry.example.com/team/app:1.2.3");
        assert_eq!(parsed.registry, "registry.example.com");
        assert_eq!(parsed.repo, "team/app");
        assert_eq!(parsed.tag, "1.2.3");
        assert_eq!(parsed.digest, "");
    }

    #[test]
    fn parses_bare_repo_tag() {
        let parsed = parse_image_path("nginx:latest");
        assert_eq!(parsed.registry, "");
        assert_eq!(parsed.repo, "nginx");
        assert_eq!(parsed.tag, "latest");
    }

    #[test]
    fn parses_registry_repo_without_tag() {
        let parsed = parse_image_path("registry.example.com/team/app");
        assert_eq!(parsed.registry, "registry.example.com");
        assert_eq!(parsed.repo, "team/app");
        assert_eq!(parsed.tag, "");
        assert_eq!(parsed.digest, "");
    }

    #[test]
    fn parses_bare_repo() {
        let parsed = parse_image_path("nginx");
        assert_eq!(parsed.registry, "");
        assert_eq!(parsed.repo, "nginx");
        assert_eq!(parsed.tag, "");
        assert_eq!(parsed.digest, "");
    }

    #[test]
    fn parse_is_left_inverse_of_canonical() {
        let shapes = [
            ImageRef {
                registry: "registry.example.com".into(),
                repo: "team/app".into(),
                tag: String::new(),
                digest: "sha256:abc".into(),
            },
            ImageRef {
                registry: "registry.example.com".into(),
                repo: "team/app".into(),
                tag: "1.0".into(),
                digest: String::new(),
            },
            ImageRef {
                registry: String::new(),
                repo: "app".into(),
                tag: "1.0".into(),
                digest: String::new(),
            },
            ImageRef {
                registry: String::new(),
                repo: "app".into(),
                tag: String::new(),
                digest: String::new(),
            },
        ];
        for expected in shapes {
            let parsed = parse_image_path(&expected.canonical());
            assert_eq!(parsed, expected, "round trip of {}", expected.canonical());
        }
    }

    #[test]
    fn digest_from_pullable_image_id() {
        assert_eq!(
            parse_image_digest("docker-pullable://registry.example.com/app@sha256:feed"),
            Some("sha256:feed".to_string())
        );
    }

    #[test]
    fn digest_from_local_image_id() {
        assert_eq!(
            parse_image_digest("docker://sha256:cafe"),
            Some("sha256:cafe".to_string())
        );
    }

    #[test]
    fn digest_absent_when_unrecognized() {
        assert_eq!(parse_image_digest("containerd://sha256:dead"), None);
    }
}
