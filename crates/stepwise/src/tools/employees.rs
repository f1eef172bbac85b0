use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stepwise_core::tool::{Registry, Tool, ToolResult};

use crate::store::{EmployeeStore, NewEmployee, StoreError};

/// Registers every employee tool, all sharing one store.
pub fn register_employee_tools(registry: &mut Registry, store: &EmployeeStore) {
    registry.add_tool(AddEmployeeTool::new(store.clone()));
    registry.add_tool(ListEmployeesTool::new(store.clone()));
    registry.add_tool(GetEmployeeTool::new(store.clone()));
    registry.add_tool(UpdateSalaryTool::new(store.clone()));
    registry.add_tool(DeleteEmployeeTool::new(store.clone()));
}

// Database failures are answered as text so the model can tell the user.
fn render<T: Serialize>(
    result: Result<T, StoreError>,
    failed: &str,
) -> ToolResult {
    Ok(match result {
        Ok(value) => serde_json::to_string(&value)
            .unwrap_or_else(|err| format!("{failed}: {err}")),
        Err(err) => {
            warn!("{failed}: {err}");
            format!("{failed}: {err}")
        }
    })
}

fn render_found<T: Serialize>(
    result: Result<Option<T>, StoreError>,
    id: i64,
    failed: &str,
) -> ToolResult {
    match result {
        Ok(Some(value)) => render(Ok(value), failed),
        Ok(None) => Ok(format!("No employee found with id {id}")),
        Err(err) => render::<T>(Err(err), failed),
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct AddEmployeeParameters {
    #[schemars(description = "Full name of the employee")]
    name: String,
    #[schemars(description = "Age of the employee")]
    age: i64,
    #[schemars(description = "Department name")]
    department: String,
    #[schemars(description = "Current salary")]
    salary: f64,
}

/// Inserts a new employee.
pub struct AddEmployeeTool {
    store: EmployeeStore,
    parameter_schema: Value,
}

impl AddEmployeeTool {
    /// Creates the tool on top of a store.
    #[inline]
    pub fn new(store: EmployeeStore) -> Self {
        Self {
            store,
            parameter_schema: schema_for!(AddEmployeeParameters).to_value(),
        }
    }
}

impl Tool for AddEmployeeTool {
    type Input = AddEmployeeParameters;

    fn name(&self) -> &str {
        "add_employee"
    }

    fn description(&self) -> &str {
        "Add a new employee to the database."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let store = self.store.clone();
        async move {
            let new = NewEmployee {
                name: input.name,
                age: input.age,
                department: input.department,
                salary: input.salary,
            };
            render(store.add(new).await, "Error adding employee")
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct ListEmployeesParameters {}

/// Lists every employee.
pub struct ListEmployeesTool {
    store: EmployeeStore,
    parameter_schema: Value,
}

impl ListEmployeesTool {
    /// Creates the tool on top of a store.
    #[inline]
    pub fn new(store: EmployeeStore) -> Self {
        Self {
            store,
            parameter_schema: schema_for!(ListEmployeesParameters).to_value(),
        }
    }
}

impl Tool for ListEmployeesTool {
    type Input = ListEmployeesParameters;

    fn name(&self) -> &str {
        "list_employees"
    }

    fn description(&self) -> &str {
        "Return a list of all employees in the database."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        _input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let store = self.store.clone();
        async move { render(store.list().await, "Error listing employees") }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct EmployeeIdParameters {
    #[schemars(description = "ID of the employee")]
    employee_id: i64,
}

/// Fetches one employee by id.
pub struct GetEmployeeTool {
    store: EmployeeStore,
    parameter_schema: Value,
}

impl GetEmployeeTool {
    /// Creates the tool on top of a store.
    #[inline]
    pub fn new(store: EmployeeStore) -> Self {
        Self {
            store,
            parameter_schema: schema_for!(EmployeeIdParameters).to_value(),
        }
    }
}

impl Tool for GetEmployeeTool {
    type Input = EmployeeIdParameters;

    fn name(&self) -> &str {
        "get_employee_by_id"
    }

    fn description(&self) -> &str {
        "Fetch a single employee's details by their ID."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let store = self.store.clone();
        async move {
            let id = input.employee_id;
            render_found(store.get(id).await, id, "Error fetching employee")
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct UpdateSalaryParameters {
    #[schemars(description = "ID of the employee whose salary should be updated")]
    employee_id: i64,
    #[schemars(description = "New salary value")]
    new_salary: f64,
}

/// Changes the salary of one employee.
pub struct UpdateSalaryTool {
    store: EmployeeStore,
    parameter_schema: Value,
}

impl UpdateSalaryTool {
    /// Creates the tool on top of a store.
    #[inline]
    pub fn new(store: EmployeeStore) -> Self {
        Self {
            store,
            parameter_schema: schema_for!(UpdateSalaryParameters).to_value(),
        }
    }
}

impl Tool for UpdateSalaryTool {
    type Input = UpdateSalaryParameters;

    fn name(&self) -> &str {
        "update_employee_salary"
    }

    fn description(&self) -> &str {
        "Update the salary of an employee."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let store = self.store.clone();
        async move {
            let id = input.employee_id;
            let result = store.update_salary(id, input.new_salary).await;
            render_found(result, id, "Error updating salary")
        }
    }
}

/// Deletes one employee by id.
pub struct DeleteEmployeeTool {
    store: EmployeeStore,
    parameter_schema: Value,
}

impl DeleteEmployeeTool {
    /// Creates the tool on top of a store.
    #[inline]
    pub fn new(store: EmployeeStore) -> Self {
        Self {
            store,
            parameter_schema: schema_for!(EmployeeIdParameters).to_value(),
        }
    }
}

impl Tool for DeleteEmployeeTool {
    type Input = EmployeeIdParameters;

    fn name(&self) -> &str {
        "delete_employee"
    }

    fn description(&self) -> &str {
        "Delete an employee from the database by ID."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    #[allow(clippy::manual_async_fn)]
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let store = self.store.clone();
        async move {
            let id = input.employee_id;
            Ok(match store.delete(id).await {
                Ok(true) => format!("Employee with id {id} deleted."),
                Ok(false) => format!("No employee found with id {id}"),
                Err(err) => {
                    warn!("Error deleting employee: {err}");
                    format!("Error deleting employee: {err}")
                }
            })
        }
    }
}
