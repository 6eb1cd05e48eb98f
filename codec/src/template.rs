// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{Metric, ParameterDataType, Value};

/// A named scalar parameter of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    data_type: ParameterDataType,
    value: Value,
}

impl Parameter {
    #[must_use]
    pub fn new(name: &str, data_type: ParameterDataType, value: Value) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            value,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn data_type(&self) -> ParameterDataType {
        self.data_type
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }
}

/// A reusable metric schema.
///
/// A *definition* declares metrics and parameters under a name; an
/// *instance* references its definition through `template_ref`. Templates
/// form value trees: instances refer to definitions by name, never by
/// pointer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Template {
    is_definition: bool,
    version: Option<String>,
    template_ref: Option<String>,
    metrics: Vec<Metric>,
    parameters: Vec<Parameter>,
}

impl Template {
    /// Create a template definition.
    #[must_use]
    pub fn definition() -> Self {
        Self {
            is_definition: true,
            ..Self::default()
        }
    }

    /// Create a template instance referencing the definition `template_ref`.
    #[must_use]
    pub fn instance(template_ref: &str) -> Self {
        Self {
            is_definition: false,
            template_ref: Some(template_ref.to_string()),
            ..Self::default()
        }
    }

    pub fn set_version(&mut self, version: &str) -> &mut Self {
        self.version = Some(version.to_string());
        self
    }

    /// Override the definition reference. The encoder enforces that
    /// definitions carry none and instances carry one.
    pub fn set_template_ref(&mut self, template_ref: Option<&str>) -> &mut Self {
        self.template_ref = template_ref.map(str::to_string);
        self
    }

    pub fn add_metric(&mut self, metric: Metric) -> &mut Self {
        self.metrics.push(metric);
        self
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub const fn is_definition(&self) -> bool {
        self.is_definition
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    #[must_use]
    pub fn template_ref(&self) -> Option<&str> {
        self.template_ref.as_deref()
    }

    #[must_use]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub(crate) fn from_parts(
        is_definition: bool,
        version: Option<String>,
        template_ref: Option<String>,
        metrics: Vec<Metric>,
        parameters: Vec<Parameter>,
    ) -> Self {
        Self {
            is_definition,
            version,
            template_ref,
            metrics,
            parameters,
        }
    }
}

/// Registry of template definitions keyed by name.
///
/// Instances carry only the `template_ref` string; hosts that need the
/// referenced schema resolve it here.
#[derive(Debug, Default, Clone)]
pub struct TemplateRegistry {
    definitions: std::collections::HashMap<String, Template>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under `name`, replacing any previous one.
    pub fn register(&mut self, name: &str, definition: Template) {
        self.definitions.insert(name.to_string(), definition);
    }

    #[must_use]
    pub fn resolve(&self, template_ref: &str) -> Option<&Template> {
        self.definitions.get(template_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
