use chrono::NaiveDate;
use clap::Args;
use ippis_registration::config::RegistrationConfig;
use ippis_registration::error::AppError;
use ippis_registration::workflows::registration::{
    DocumentSet, EmploymentDetails, IdFormat, MemoryRegistrationStore, PersonalDetails,
    Registration, RegistrationIdGenerator, RegistrationWorkflow, VerificationDetails,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Use the compact IPPIS-NNNNNN-NNNN id layout instead of the sortable one.
    #[arg(long)]
    pub(crate) compact_ids: bool,
    /// Send the submission back once before the final decision.
    #[arg(long)]
    pub(crate) return_first: bool,
    /// Reject the registration instead of approving it.
    #[arg(long)]
    pub(crate) reject: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        compact_ids,
        return_first,
        reject,
    } = args;

    let config = RegistrationConfig {
        id_format: if compact_ids {
            IdFormat::Compact
        } else {
            IdFormat::Sortable
        },
        ..RegistrationConfig::default()
    };
    let store = Arc::new(MemoryRegistrationStore::default());
    let workflow = RegistrationWorkflow::with_generator(
        store,
        RegistrationIdGenerator::from_config(&config),
        &config,
    );

    println!("IPPIS registration demo (in-memory store)");
    let registration = workflow.create_registration().await?;
    let id = registration.registration_id.clone();
    print_state("Created", &registration);

    let saved = workflow
        .save_verification_data(&id, demo_verification(false))
        .await?;
    print_state("Verification saved (NIN pending)", &saved.registration);
    let saved = workflow
        .save_verification_data(&id, demo_verification(true))
        .await?;
    print_state("Verification confirmed", &saved.registration);

    let saved = workflow.save_personal_info(&id, demo_personal()).await?;
    print_state("Personal information saved", &saved.registration);
    let saved = workflow.save_employment_info(&id, demo_employment()).await?;
    print_state("Employment information saved", &saved.registration);
    let saved = workflow.save_document_uploads(&id, demo_documents()).await?;
    print_state("Documents uploaded", &saved.registration);

    if let Err(err) = workflow.submit_registration(&id, false).await {
        println!("- Submission without declaration refused: {err}");
    }
    let submitted = workflow.submit_registration(&id, true).await?;
    print_state("Submitted", &submitted);

    if return_first {
        let returned = workflow
            .mark_incomplete(&id, "hr.desk", "appointment letter scan is unreadable")
            .await?;
        print_state("Returned for corrections", &returned);
        let mut documents = demo_documents();
        documents.appointment_letter = "uploads/demo/appointment-letter-rescan.pdf".to_string();
        workflow.save_document_uploads(&id, documents).await?;
        let resubmitted = workflow.submit_registration(&id, true).await?;
        print_state("Resubmitted", &resubmitted);
    }

    let decided = if reject {
        workflow
            .reject_registration(&id, "hr.director", "record already exists on the payroll")
            .await?
    } else {
        workflow.approve_registration(&id, "hr.director").await?
    };
    print_state("Reviewed", &decided);

    let history = workflow.registration_history(&id).await?;
    println!("\nHistory for {id}");
    for entry in history {
        println!(
            "  #{:<2} {:<18} {}",
            entry.id,
            entry.action.label(),
            entry.details
        );
    }

    let aggregate = workflow.get_registration(&id, false).await?;
    match serde_json::to_string_pretty(&aggregate) {
        Ok(json) => println!("\nStored aggregate:\n{json}"),
        Err(err) => println!("\nStored aggregate unavailable: {err}"),
    }

    Ok(())
}

fn print_state(label: &str, registration: &Registration) {
    let completed: Vec<&str> = registration
        .completed_steps
        .iter()
        .map(|step| step.label())
        .collect();
    println!(
        "- {label}: {} | status {} | step {} | completed [{}]",
        registration.registration_id,
        registration.status,
        registration.current_step,
        completed.join(", ")
    );
    if let Some(note) = &registration.review_note {
        println!("  review note: {note}");
    }
}

fn demo_verification(nin_verified: bool) -> VerificationDetails {
    VerificationDetails {
        bvn: "22233344455".to_string(),
        bvn_verified: true,
        nin: "90011122233".to_string(),
        nin_verified,
    }
}

fn demo_personal() -> PersonalDetails {
    PersonalDetails {
        title: "Mr".to_string(),
        first_name: "Emeka".to_string(),
        middle_name: None,
        last_name: "Nwosu".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1993, 7, 21).unwrap_or_default(),
        gender: "male".to_string(),
        marital_status: "single".to_string(),
        phone_number: "+2348061234567".to_string(),
        email: "emeka.nwosu@example.gov.ng".to_string(),
        residential_address: "22 Aminu Kano Crescent, Wuse II, Abuja".to_string(),
        state_of_origin: "Enugu".to_string(),
        local_government_area: "Nsukka".to_string(),
        next_of_kin_name: "Ngozi Nwosu".to_string(),
        next_of_kin_phone: "+2348067654321".to_string(),
        next_of_kin_relationship: "mother".to_string(),
    }
}

fn demo_employment() -> EmploymentDetails {
    EmploymentDetails {
        ministry: "Federal Ministry of Works".to_string(),
        department: "Highways".to_string(),
        designation: "Engineer II".to_string(),
        grade_level: 9,
        grade_step: 1,
        employment_type: "permanent".to_string(),
        date_of_first_appointment: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap_or_default(),
        date_of_confirmation: None,
        salary_structure: "CONPSS".to_string(),
        bank_name: "Guaranty Trust Bank".to_string(),
        account_number: "0123456789".to_string(),
        pension_administrator: "Premium Pension".to_string(),
        pension_pin: None,
    }
}

fn demo_documents() -> DocumentSet {
    DocumentSet {
        passport_photograph: "uploads/demo/passport.jpg".to_string(),
        birth_certificate: "uploads/demo/birth-certificate.pdf".to_string(),
        appointment_letter: "uploads/demo/appointment-letter.pdf".to_string(),
        educational_certificates: vec!["uploads/demo/beng.pdf".to_string()],
        other_documents: vec!["uploads/demo/nysc-discharge.pdf".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_runs_every_path() {
        run_demo(DemoArgs::default()).await.expect("approve path");
        run_demo(DemoArgs {
            compact_ids: true,
            return_first: true,
            reject: true,
        })
        .await
        .expect("return then reject path");
    }
}
