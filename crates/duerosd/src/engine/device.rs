use serde::Serialize;

/// A device in the duerosd system.
///
/// A device represents the physical appliance behind one or more entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            identifiers: Vec::new(),
            name: name.into(),
            manufacturer: None,
            model: None,
        }
    }

    pub fn with_identifier(mut self, domain: impl Into<String>, id: impl Into<String>) -> Self {
        let identifier = (domain.into(), id.into());
        if !self.identifiers.contains(&identifier) {
            self.identifiers.push(identifier);
        }
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}
