pub mod context;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use super::context::*;
    pub use super::*;
    pub use crate::model::*;
    pub use crate::*;
}

use crate::model::{ParameterType, ToolsGraph, ToolsGraphDefinition};
use crate::{GraphDefinition, NodeIndex, StringId, VariationHierarchy};

use self::context::{
    CompilationLogEntry, GraphCompilationContext, GraphCompileError, RegisteredDataSlot,
};

use uuid::Uuid;

/// Compiles a tools graph into a [`GraphDefinition`] for one target
/// variation. The compiler is reusable; each call starts from a fresh
/// context, and the log of the most recent run stays readable afterwards.
#[derive(Default)]
pub struct GraphDefinitionCompiler {
    context: GraphCompilationContext,
}

impl GraphDefinitionCompiler {
    /// Compiles against the `Default` variation.
    pub fn compile(
        &mut self,
        definition: &ToolsGraphDefinition,
    ) -> Result<GraphDefinition, GraphCompileError> {
        self.compile_variation(definition, &VariationHierarchy::default_id())
    }

    pub fn compile_variation(
        &mut self,
        definition: &ToolsGraphDefinition,
        variation_id: &StringId,
    ) -> Result<GraphDefinition, GraphCompileError> {
        let Some(case_correct_id) = definition
            .variations
            .try_get_case_correct_variation_id(variation_id.as_str())
        else {
            self.context.reset(definition, variation_id.clone());
            let err = GraphCompileError::UnknownVariation(variation_id.clone());
            self.context.log_error(None, err.to_string());
            return Err(err);
        };
        self.context.reset(definition, case_correct_id);

        let compiled = self.run_phases(definition)?;

        let errors = self.context.error_count();
        if errors != 0 {
            return Err(GraphCompileError::CompilationFailed(errors));
        }
        Ok(compiled)
    }

    pub fn log(&self) -> &[CompilationLogEntry] {
        self.context.log()
    }

    /// Data slots of the last compilation, resolved through the target
    /// variation. Input to the asset pipeline's dependency collection.
    pub fn registered_data_slots(&self) -> &[RegisteredDataSlot] {
        self.context.registered_data_slots()
    }

    fn run_phases(
        &mut self,
        definition: &ToolsGraphDefinition,
    ) -> Result<GraphDefinition, GraphCompileError> {
        self.validate_variations(&definition.variations)?;
        let control_parameter_ids = self.compile_control_parameters(&definition.root_graph)?;
        let (virtual_parameter_ids, virtual_parameter_nodes) =
            self.compile_virtual_parameters(&definition.root_graph)?;
        let root = self.compile_result_node(&definition.root_graph)?;
        Ok(self.context.build_definition(
            root,
            control_parameter_ids,
            virtual_parameter_ids,
            virtual_parameter_nodes,
        ))
    }

    fn validate_variations(
        &mut self,
        variations: &VariationHierarchy,
    ) -> Result<(), GraphCompileError> {
        for variation in variations.variations() {
            if !variation.skeleton.is_valid() {
                let err = GraphCompileError::MissingVariationSkeleton(variation.id.clone());
                self.context.log_error(None, err.to_string());
                return Err(err);
            }
        }
        Ok(())
    }

    fn compile_node_logged(
        &mut self,
        graph: &ToolsGraph,
        id: Uuid,
    ) -> Result<NodeIndex, GraphCompileError> {
        match graph.compile_node(id, &mut self.context) {
            Ok(index) => Ok(index),
            Err(err) => {
                self.context.log_error(Some(id), err.to_string());
                Err(err)
            }
        }
    }

    /// Compiled in discovery order; the position of each parameter becomes
    /// its value-storage slot at runtime.
    fn compile_control_parameters(
        &mut self,
        graph: &ToolsGraph,
    ) -> Result<Vec<StringId>, GraphCompileError> {
        let mut ids: Vec<StringId> = Vec::new();
        let mut seen: Vec<(StringId, ParameterType)> = Vec::new();

        for parameter in graph.control_parameters() {
            for (existing, existing_type) in &seen {
                if existing == &parameter.name && *existing_type != parameter.value_type {
                    self.context.log_warning(
                        Some(parameter.id),
                        format!(
                            "control parameter \"{}\" redeclared with a different type",
                            parameter.name
                        ),
                    );
                } else if existing != &parameter.name
                    && existing.eq_ignore_case(parameter.name.as_str())
                {
                    self.context.log_warning(
                        Some(parameter.id),
                        format!(
                            "control parameter \"{}\" differs from \"{}\" only by case",
                            parameter.name, existing
                        ),
                    );
                }
            }
            seen.push((parameter.name.clone(), parameter.value_type));

            self.compile_node_logged(graph, parameter.id)?;
            ids.push(parameter.name.clone());
        }
        Ok(ids)
    }

    fn compile_virtual_parameters(
        &mut self,
        graph: &ToolsGraph,
    ) -> Result<(Vec<StringId>, Vec<NodeIndex>), GraphCompileError> {
        let mut ids = Vec::new();
        let mut nodes = Vec::new();
        for parameter in graph.virtual_parameters() {
            let index = self.compile_node_logged(graph, parameter.id)?;
            ids.push(parameter.name.clone());
            nodes.push(index);
        }
        Ok((ids, nodes))
    }

    fn compile_result_node(&mut self, graph: &ToolsGraph) -> Result<NodeIndex, GraphCompileError> {
        let mut results = graph.result_nodes();
        let (Some(result), None) = (results.next(), results.next()) else {
            let count = graph.result_nodes().count();
            let err = GraphCompileError::UnexpectedResultNodeCount(count);
            self.context.log_error(None, err.to_string());
            return Err(err);
        };
        self.compile_node_logged(graph, result.id)
    }
}
