use credentialing::catalog::SpecialtyCatalog;
use credentialing::config::{CatalogConfig, ScreeningConfig};
use credentialing::error::AppError;
use credentialing::storage::memory::{
    InMemoryNotifier, InMemoryOrganizationDirectory, InMemoryProfessionalRepository,
    InMemoryScreeningRepository,
};
use credentialing::workflows::professionals::ProfessionalService;
use credentialing::workflows::screening::ScreeningService;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Professionals =
    ProfessionalService<InMemoryProfessionalRepository, InMemoryOrganizationDirectory>;
pub(crate) type Screenings = ScreeningService<
    InMemoryScreeningRepository,
    InMemoryProfessionalRepository,
    InMemoryOrganizationDirectory,
    InMemoryNotifier,
>;

/// In-memory wiring shared by the server and the demo.
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) organizations: Arc<InMemoryOrganizationDirectory>,
    pub(crate) professionals: Arc<Professionals>,
    pub(crate) screenings: Arc<Screenings>,
    pub(crate) notifier: InMemoryNotifier,
}

impl Services {
    pub(crate) fn in_memory(catalog: SpecialtyCatalog, screening: ScreeningConfig) -> Self {
        let organizations = Arc::new(InMemoryOrganizationDirectory::default());
        let notifier = InMemoryNotifier::default();
        let professionals = Arc::new(ProfessionalService::new(
            Arc::new(InMemoryProfessionalRepository::default()),
            organizations.clone(),
            Arc::new(catalog),
        ));
        let screenings = Arc::new(ScreeningService::new(
            Arc::new(InMemoryScreeningRepository::default()),
            professionals.clone(),
            Arc::new(notifier.clone()),
            screening,
        ));

        Self {
            organizations,
            professionals,
            screenings,
            notifier,
        }
    }
}

pub(crate) fn load_catalog(config: &CatalogConfig) -> Result<SpecialtyCatalog, AppError> {
    match config.specialty_csv.as_ref() {
        Some(path) => {
            let catalog = SpecialtyCatalog::from_path(path)?;
            info!(path = %path.display(), specialties = catalog.len(), "specialty catalog loaded");
            Ok(catalog)
        }
        None => {
            warn!("APP_SPECIALTY_CATALOG not set; specialty catalog is empty");
            Ok(SpecialtyCatalog::default())
        }
    }
}
