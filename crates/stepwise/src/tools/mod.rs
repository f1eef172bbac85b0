//! The built-in tools models can use.

mod employees;
mod shell;
mod weather;

pub use employees::{
    AddEmployeeTool, DeleteEmployeeTool, GetEmployeeTool, ListEmployeesTool,
    UpdateSalaryTool, register_employee_tools,
};
pub use shell::RunCommandTool;
pub use weather::WeatherTool;
