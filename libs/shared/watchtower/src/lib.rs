// [libs/shared/watchtower/src/lib.rs]
/*!
 * =================================================================
 * APARATO: WATCHTOWER OBSERVABILITY CORE (V5.0 - NOISE FLOOR)
 * CLASIFICACIÓN: SHARED UTILITY (ESTRATO L4)
 * RESPONSABILIDAD: FILTRADO DE RUIDO, FORMATO DE TRAZAS Y BALIZA DE PÁNICO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. NOISE FLOOR TABLE: El piso de ruido de la infraestructura (axum,
 *    hyper, libSQL, reqwest, rustls) vive en una tabla declarativa;
 *    el dominio de la flota conserva la señal completa.
 * 2. FORMAT BY DECREE: 'AVIARY_LOG_FORMAT' decide el emisor (json |
 *    compact) por encima del perfil de compilación, porque el
 *    coordinador corre en contenedores release durante el desarrollo
 *    del Dashboard.
 * 3. PANIC BEACON: Un pánico en cualquier daemon (watchdogs, cron de
 *    facturación) emite una baliza con el hilo y la coordenada exacta
 *    antes de la defunción del proceso.
 * =================================================================
 */

use std::panic;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Piso de ruido de las crates de infraestructura que rodean al
/// coordinador. Todo lo que no figura aquí hereda el nivel del servicio.
const INFRASTRUCTURE_NOISE_FLOOR: &[(&str, &str)] = &[
    ("hyper", "warn"),
    ("tower_http", "warn"),
    ("axum::rejection", "trace"),
    ("libsql", "error"),
    ("reqwest", "warn"),
    ("rustls", "warn"),
];

/// Compone la directiva de filtrado: señal plena para el servicio,
/// piso de ruido para la infraestructura circundante.
fn compose_noise_filter(service_label: &str, verbose_domain: bool) -> String {
    let domain_level = if verbose_domain { "debug" } else { "info" };

    let mut directives = Vec::with_capacity(INFRASTRUCTURE_NOISE_FLOOR.len() + 1);
    directives.push(format!("{service_label}={domain_level}"));
    for (noisy_crate, ceiling) in INFRASTRUCTURE_NOISE_FLOOR {
        directives.push(format!("{noisy_crate}={ceiling}"));
    }

    directives.join(",")
}

/// Enciende la observabilidad del proceso: filtro, emisor y baliza.
///
/// 'RUST_LOG' manda sobre la tabla; 'AVIARY_LOG_FORMAT=json|compact'
/// manda sobre el perfil de compilación.
///
/// # Panics:
/// Si otro suscriptor global ya fue inicializado en este runtime.
pub fn ignite_observability(service_label: &str) {
    let filter_directives = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(compose_noise_filter(service_label, cfg!(debug_assertions)))
    });

    let wants_json = match std::env::var("AVIARY_LOG_FORMAT").as_deref() {
        Ok("json") => true,
        Ok("compact") => false,
        _ => !cfg!(debug_assertions),
    };

    if wants_json {
        // Emisión plana para la ingesta del Panóptico.
        tracing_subscriber::registry()
            .with(filter_directives)
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_directives)
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .init();
    }

    install_panic_beacon(service_label);

    info!("👁️  [WATCHTOWER_ONLINE]: Noise floor armed for [{}].", service_label);
}

/// Baliza de pánico: captura el hilo, la coordenada y la carga del
/// colapso para que el rastro sobreviva a la muerte del proceso.
fn install_panic_beacon(service_label: &str) {
    let service_owner = service_label.to_string();

    panic::set_hook(Box::new(move |panic_info| {
        let crash_site = match panic_info.location() {
            Some(location) => format!("{}:{}", location.file(), location.line()),
            None => "<unlocated>".to_string(),
        };

        let thread_handle = std::thread::current();
        let crashing_thread = thread_handle.name().unwrap_or("<unnamed>");

        let collapse_detail = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| panic_info.payload().downcast_ref::<&str>().copied())
            .unwrap_or("<opaque payload>");

        error!(
            target: "panic_beacon",
            service = %service_owner,
            thread = %crashing_thread,
            site = %crash_site,
            "☄️ [PANIC_BEACON]: {}",
            collapse_detail
        );
    }));
}
