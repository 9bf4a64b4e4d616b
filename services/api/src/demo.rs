use crate::infra::{in_memory_admissions, parse_academic_year};
use admissions::config::AdmissionsConfig;
use admissions::error::AppError;
use admissions::workflows::admission::{
    AcademicYear, Actor, AdmissionRequest, AdmissionService, ApplicationId, ApplicationStatus,
    ApplicationSubmission, Gender, LeadSource, ParentType, Standard, StatusUpdate,
};
use clap::Args;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Section to admit the demo student into.
    #[arg(long, default_value = "A")]
    pub(crate) section: String,
    /// Academic year for the admission (YYYY-YYYY). Defaults to the current one.
    #[arg(long, value_parser = parse_academic_year)]
    pub(crate) academic_year: Option<AcademicYear>,
    /// Stop after the application reaches payment_pending.
    #[arg(long)]
    pub(crate) skip_admit: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        section,
        academic_year,
        skip_admit,
    } = args;

    let academic_year = academic_year.unwrap_or_else(AcademicYear::current);
    let config = AdmissionsConfig {
        academic_year: Some(academic_year),
        ..AdmissionsConfig::default()
    };
    let admissions = in_memory_admissions(&config);
    let service = admissions.service.clone();
    let office = Actor::staff("Admissions office");

    println!("Admissions workflow demo ({academic_year}, {})", config.default_branch);

    let application = service.submit(demo_submission("Aarav R", "2021-01-01"))?;
    println!(
        "- Submitted application {} -> status {}",
        application.reference_number.0, application.status
    );

    let token = service.resolve_tracking_token(&application.reference_number.0, "2021-01-01")?;
    println!("- Resolved tracking token from reference number and date of birth");

    service.submit_documents_link(&token, "https://drive.google.com/drive/folders/aarav-docs")?;
    println!("- Parent shared a documents folder");

    advance(
        &service,
        &application.id,
        &office,
        &[
            ApplicationStatus::EnquiryHot,
            ApplicationStatus::DocumentsPending,
            ApplicationStatus::DocumentsVerified,
            ApplicationStatus::PaymentPending,
        ],
    )?;

    service.submit_payment_receipt_link(&token, "https://payments.example.org/receipt/1042")?;
    println!("- Parent shared a payment receipt");

    let view = service.get_by_tracking_token(&token)?.tracking_view();
    match serde_json::to_string_pretty(&view) {
        Ok(json) => println!("  Public tracking payload:\n{}", json),
        Err(err) => println!("  Public tracking payload unavailable: {}", err),
    }

    if skip_admit {
        return Ok(());
    }

    let outcome = service.admit(
        &application.id,
        AdmissionRequest {
            section: section.clone(),
            academic_year: academic_year.to_string(),
        },
        office.clone(),
    )?;
    println!(
        "- Admitted: admission number {} | roll number {}",
        outcome.admission_number, outcome.roll_number
    );
    println!(
        "  Parent login {} ({})",
        outcome.parent_credentials.login_email,
        if outcome.parent_credentials.default_password.is_some() {
            "new account, default password issued once"
        } else {
            "existing account linked"
        }
    );

    println!("\nSibling enquiry from the same parent");
    let sibling = service.register_walk_in(
        demo_submission("Diya R", "2020-08-14"),
        ApplicationStatus::EnquiryWarm,
        office.clone(),
    )?;
    advance(
        &service,
        &sibling.id,
        &office,
        &[
            ApplicationStatus::DocumentsPending,
            ApplicationStatus::DocumentsVerified,
        ],
    )?;
    let sibling_outcome = service.admit(
        &sibling.id,
        AdmissionRequest {
            section,
            academic_year: academic_year.to_string(),
        },
        office.clone(),
    )?;
    println!(
        "- Admitted: admission number {} | roll number {} | parent account reused: {}",
        sibling_outcome.admission_number,
        sibling_outcome.roll_number,
        sibling_outcome.parent_credentials.default_password.is_none()
    );

    let summary = service.pipeline_summary()?;
    println!("\nPipeline: {} applications", summary.total);
    for (status, count) in summary.by_status.iter().filter(|(_, count)| **count > 0) {
        println!("  - {status}: {count}");
    }

    println!(
        "\nStudents enrolled: {} | parent accounts: {}",
        admissions.store.student_count(),
        admissions.accounts.len()
    );
    let sent = admissions.outbox.sent();
    if sent.is_empty() {
        println!("Parent notifications: none dispatched");
    } else {
        println!("Parent notifications:");
        for notification in sent {
            println!(
                "  - {:?} -> {}",
                notification.template, notification.recipient
            );
        }
    }

    Ok(())
}

fn advance(
    service: &AdmissionService,
    id: &ApplicationId,
    actor: &Actor,
    path: &[ApplicationStatus],
) -> Result<(), AppError> {
    for status in path {
        let change = service.update_status(
            id,
            StatusUpdate {
                status: *status,
                remarks: None,
                admission: None,
            },
            actor.clone(),
        )?;
        println!("  -> {}", change.application.status);
    }
    Ok(())
}

fn demo_submission(student_name: &str, date_of_birth: &str) -> ApplicationSubmission {
    ApplicationSubmission {
        branch: None,
        student_name: student_name.to_string(),
        gender: Gender::Male,
        date_of_birth: date_of_birth.to_string(),
        applying_for_class: Standard::PreKg,
        source: LeadSource::WalkIn,
        parent_type: ParentType::Mother,
        parent_name: "Meena R".to_string(),
        mobile: "9876543210".to_string(),
        email: "meena.r@example.com".to_string(),
        remarks: None,
        documents_link: None,
        payment_receipt_link: None,
    }
}
