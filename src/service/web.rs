//! Web service: nginx serving a static index page.

use serde::{Deserialize, Serialize};

use super::{Server, Service, ServiceCore};
use crate::emulator::snapshot::SnapshotError;
use crate::emulator::Emulator;
use crate::error::Result;
use crate::layer::Layer;
use crate::node::Node;

/// Type name shared by every web service layer.
pub const WEB_SERVICE: &str = "WebService";

const DEFAULT_INDEX: &str = "<h1>{nodeName} at AS{asn}!</h1>";
const INDEX_PATH: &str = "/var/www/html/index.html";
const SITE_PATH: &str = "/etc/nginx/sites-available/default";

/// An nginx instance on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebServer {
    port: u16,
    index: String,
}

impl Default for WebServer {
    fn default() -> Self {
        Self {
            port: 80,
            index: DEFAULT_INDEX.to_string(),
        }
    }
}

impl WebServer {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    /// Index page template; `{nodeName}` and `{asn}` are substituted at
    /// install time.
    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn set_index_content(&mut self, content: impl Into<String>) -> &mut Self {
        self.index = content.into();
        self
    }

    fn site_config(&self) -> String {
        format!(
            "server {{\n    listen {port};\n    root /var/www/html;\n    index index.html;\n    server_name _;\n    location / {{\n        try_files $uri $uri/ =404;\n    }}\n}}\n",
            port = self.port
        )
    }
}

impl Server for WebServer {
    fn install(&mut self, node: &mut Node) -> Result<()> {
        let index = self
            .index
            .replace("{nodeName}", node.name())
            .replace("{asn}", &node.asn().to_string());
        let site = self.site_config();

        node.add_software("nginx-light")
            .set_file(INDEX_PATH, index)
            .set_file(SITE_PATH, site)
            .append_start_command("service nginx start", false);
        node.attributes_mut().set("web.port", self.port);
        Ok(())
    }
}

/// Layer installing [`WebServer`]s on virtual nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebService {
    name: String,
    core: ServiceCore<WebServer>,
}

impl Default for WebService {
    fn default() -> Self {
        Self::new()
    }
}

impl WebService {
    pub fn new() -> Self {
        Self::with_name(WEB_SERVICE)
    }

    /// A web service registered under a custom layer name. Its type name
    /// stays `WebService`.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            core: ServiceCore::default(),
        }
    }

    /// Stage a web server on `vnode`. Installing twice returns the same
    /// server.
    pub fn install(&mut self, vnode: &str) -> &mut WebServer {
        self.core.install_with(vnode, Self::create_server)
    }

    pub fn create_server() -> WebServer {
        WebServer::default()
    }

    pub fn server(&self, vnode: &str) -> Option<&WebServer> {
        self.core.server(vnode)
    }

    pub fn core(&self) -> &ServiceCore<WebServer> {
        &self.core
    }

    /// Combine two web services; the receiver keeps its name.
    pub fn merge(mut self, other: WebService) -> Result<Self> {
        self.core = self.core.merge(other.core)?;
        Ok(self)
    }

    pub fn restore(state: &str) -> Result<Box<dyn Layer>> {
        let service: WebService =
            serde_json::from_str(state).map_err(|e| SnapshotError::LayerState(WEB_SERVICE.to_string(), e))?;
        Ok(Box::new(service))
    }
}

impl Layer for WebService {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        WEB_SERVICE
    }

    fn configure(&mut self, emulator: &mut Emulator) -> Result<()> {
        self.core.configure_targets(&self.name, emulator)
    }

    fn render(&mut self, emulator: &mut Emulator) -> Result<()> {
        self.core.install_targets(&self.name, emulator)
    }

    fn as_service(&self) -> Option<&dyn Service> {
        Some(self)
    }

    fn as_service_mut(&mut self) -> Option<&mut dyn Service> {
        Some(self)
    }

    fn save(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SnapshotError::LayerState(self.name.clone(), e).into())
    }
}

impl Service for WebService {
    fn pending_vnodes(&self) -> Vec<String> {
        self.core.pending_vnodes()
    }

    fn rename_pending(&mut self, prefix: &str) {
        self.core.rename_pending(prefix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeRole;

    #[test]
    fn test_install_returns_existing_server() {
        let mut web = WebService::new();
        web.install("site").set_port(8080);
        assert_eq!(web.install("site").port(), 8080);
        assert_eq!(web.pending_vnodes(), vec!["site"]);
    }

    #[test]
    fn test_server_install_writes_node() {
        let mut node = Node::new("web", 150, NodeRole::Host);
        let mut server = WebServer::default();
        server.set_port(8080);
        server.install(&mut node).unwrap();

        assert!(node.software().contains("nginx-light"));
        assert_eq!(node.files()[INDEX_PATH], "<h1>web at AS150!</h1>");
        assert!(node.files()[SITE_PATH].contains("listen 8080;"));
        assert_eq!(node.start_commands()[0].command, "service nginx start");
        assert_eq!(node.attributes().get_integer("web.port"), Some(8080));
    }

    #[test]
    fn test_save_and_restore() {
        let mut web = WebService::with_name("Web2");
        web.install("a").set_index_content("hello");
        let restored = WebService::restore(&web.save().unwrap()).unwrap();

        assert_eq!(restored.name(), "Web2");
        assert_eq!(restored.type_name(), WEB_SERVICE);
        let restored = crate::layer::downcast_ref::<WebService>(restored.as_ref()).unwrap();
        assert_eq!(restored.server("a").unwrap().index(), "hello");
    }
}
