mod harness;
mod queries;
mod sql_rules;
