//! Console summaries of a plan and of a finished run.

use comfy_table::{Table, presets::UTF8_FULL};
use snup_deploy::{ArgDescriptor, ContractSpec, DeploymentRecord, felt::to_hex};

/// Render the deployment order of a manifest.
pub fn plan_table(order: &[&ContractSpec]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Contract", "Class", "Deploy", "Depends on", "Constructor"]);

    for (i, spec) in order.iter().enumerate() {
        let constructor = spec
            .constructor
            .iter()
            .map(describe_arg)
            .collect::<Vec<_>>()
            .join(", ");

        table.add_row(vec![
            (i + 1).to_string(),
            spec.name.clone(),
            spec.class_name().to_string(),
            if spec.deploy { "yes" } else { "declare only" }.to_string(),
            spec.dependencies().join(", "),
            constructor,
        ]);
    }

    table
}

fn describe_arg(arg: &ArgDescriptor) -> String {
    match arg {
        ArgDescriptor::Literal(value) => to_hex(value),
        ArgDescriptor::U256(value) => format!("u256({:#x}, {:#x})", value.low, value.high),
        ArgDescriptor::ClassHashOf(name) => format!("class_hash_of({})", name),
        ArgDescriptor::AddressOf(name) => format!("address_of({})", name),
        ArgDescriptor::DeployerAddress => "deployer_address".to_string(),
    }
}

/// Render the classes, instances and failures of a record.
pub fn summary_tables(record: &DeploymentRecord) -> Vec<Table> {
    let mut tables = Vec::new();

    let mut classes = Table::new();
    classes
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Class", "Class hash", "Origin"]);
    for declared in &record.declared {
        let origin = match declared.origin {
            snup_deploy::DeclareOrigin::Declared => "declared".to_string(),
            snup_deploy::DeclareOrigin::Recovered(source) => format!("recovered ({})", source),
            snup_deploy::DeclareOrigin::Cached => "cached".to_string(),
        };
        classes.add_row(vec![
            declared.name.clone(),
            declared.class.clone(),
            to_hex(&declared.class_hash),
            origin,
        ]);
    }
    tables.push(classes);

    if !record.contracts.is_empty() {
        let mut contracts = Table::new();
        contracts
            .load_preset(UTF8_FULL)
            .set_header(vec!["Contract", "Address", "Deploy tx", "Finality"]);
        for instance in &record.contracts {
            contracts.add_row(vec![
                instance.name.clone(),
                to_hex(&instance.address),
                to_hex(&instance.deploy_tx),
                instance.finality.clone(),
            ]);
        }
        tables.push(contracts);
    }

    if !record.failures.is_empty() {
        let mut failures = Table::new();
        failures
            .load_preset(UTF8_FULL)
            .set_header(vec!["Contract", "Stage", "Kind", "Detail"]);
        for failure in &record.failures {
            failures.add_row(vec![
                failure.contract.clone(),
                failure.stage.to_string(),
                failure.kind.to_string(),
                failure.detail.clone(),
            ]);
        }
        tables.push(failures);
    }

    tables
}
