//! Example: running a rollback-enabled chain against MockTransport.
//!
//! Run with: `cargo run --example mock_chain`

use mgmt_chain::schema::{CatalogOperation, SchemaCatalog};
use mgmt_chain::{ChainExecutor, MockTransport, Operation, Session, SessionConfig};
use std::sync::Arc;

fn soma(inner: &str) -> String {
    format!(
        r#"<env:Envelope xmlns:env="http://schemas.xmlsoap.org/soap/envelope/"><env:Body><dp:response xmlns:dp="http://www.datapower.com/schemas/management"><dp:timestamp>2024-01-01T00:00:00</dp:timestamp>{}</dp:response></env:Body></env:Envelope>"#,
        inner
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The object reports "pending" twice before coming up
    let mock = Arc::new(MockTransport::with_handler(|req, n| {
        Ok(if req.payload.contains("get-status") && n < 4 {
            soma("<dp:status><ObjectStatus><Name>fw-a</Name><State>pending</State></ObjectStatus></dp:status>")
        } else if req.payload.contains("get-status") {
            soma("<dp:status><ObjectStatus><Name>fw-a</Name><State>up</State></ObjectStatus></dp:status>")
        } else {
            soma("<dp:result>OK</dp:result>")
        })
    }));

    let catalog = SchemaCatalog::new("xml-mgmt.xsd")
        .with_operation(CatalogOperation::new("SaveCheckpoint").element("ChkName"))
        .with_operation(CatalogOperation::new("RollbackCheckpoint").element("ChkName"))
        .with_operation(CatalogOperation::new("RemoveCheckpoint").element("ChkName"))
        .with_operation(CatalogOperation::new("do-import").attribute("overwrite-files"))
        .with_operation(CatalogOperation::new("get-status").attribute("class"));

    let config = SessionConfig {
        host_name: Some("dp1.example.com".into()),
        user_name: Some("admin".into()),
        user_password: Some("secret".into()),
        rollback_on_error: true,
        ..Default::default()
    };
    let session = Session::builder(config)
        .schema(Arc::new(catalog))
        .transport(mock.clone())
        .build()?;

    // new_chain() prepends SaveCheckpoint because rollback is enabled
    let mut chain = session.new_chain();
    chain.add(Operation::new("do-import").with_option("overwrite-files", "true"));

    let mut status = Operation::new("get-status").with_option("class", "ObjectStatus");
    status.poll.wait_for = Some("up".into());
    status.poll.wait_time_seconds = 5;
    status.poll.poll_interval_millis = 500;
    chain.add(status);

    let report = ChainExecutor::new(&session).execute(&mut chain).await?;

    for record in &report.operations {
        println!("{:<18} {:?} polls={}", record.name, record.outcome, record.polls);
    }
    println!("Requests sent: {}", mock.request_count());
    println!("Checkpoint removed: {}", report.checkpoint_removed);
    println!("{}", report.to_json()?);

    Ok(())
}
