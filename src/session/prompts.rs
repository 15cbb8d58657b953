//! Spoken and displayed prompts, per locale

use crate::card::Ease;
use crate::remote::retry::FailureKind;
use crate::remote::{CallFailure, Grading};
use crate::voice::Locale;

/// Localized name of an ease, as the user would say it
#[must_use]
pub const fn ease_name(ease: Ease, locale: Locale) -> &'static str {
    match (locale, ease) {
        (Locale::En, Ease::Again) => "again",
        (Locale::En, Ease::Hard) => "hard",
        (Locale::En, Ease::Good) => "good",
        (Locale::En, Ease::Easy) => "easy",
        (Locale::Es, Ease::Again) => "otra vez",
        (Locale::Es, Ease::Hard) => "difícil",
        (Locale::Es, Ease::Good) => "bien",
        (Locale::Es, Ease::Easy) => "fácil",
    }
}

#[must_use]
pub const fn no_cards(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "No cards are due. Nice work.",
        Locale::Es => "No hay tarjetas pendientes. Buen trabajo.",
    }
}

#[must_use]
pub const fn didnt_catch(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "I didn't catch that. Please answer again.",
        Locale::Es => "No te entendí. Responde otra vez, por favor.",
    }
}

/// Spoken when an utterance cannot be acted on after the answer
#[must_use]
pub const fn action_hint(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Say a grade from one to four, ask a question, or say read answer.",
        Locale::Es => "Di una nota del uno al cuatro, haz una pregunta o di lee la respuesta.",
    }
}

#[must_use]
pub fn confirm_grade(ease: Ease, locale: Locale) -> String {
    let name = ease_name(ease, locale);
    match locale {
        Locale::En => format!("Grade it {name}? Say confirm or cancel."),
        Locale::Es => format!("¿Calificar como {name}? Di confirmar o cancelar."),
    }
}

#[must_use]
pub fn graded(ease: Ease, locale: Locale) -> String {
    let name = ease_name(ease, locale);
    match locale {
        Locale::En => format!("Graded {name}."),
        Locale::Es => format!("Calificada: {name}."),
    }
}

#[must_use]
pub const fn grade_cancelled(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Okay, not graded.",
        Locale::Es => "De acuerdo, sin calificar.",
    }
}

#[must_use]
pub const fn confirm_delete(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Remove this card from review? Say confirm or cancel.",
        Locale::Es => "¿Quitar esta tarjeta del repaso? Di confirmar o cancelar.",
    }
}

#[must_use]
pub const fn delete_cancelled(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Okay, keeping it.",
        Locale::Es => "De acuerdo, la conservo.",
    }
}

#[must_use]
pub const fn stopped(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Review stopped.",
        Locale::Es => "Repaso detenido.",
    }
}

#[must_use]
pub const fn microphone_unavailable(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "The microphone is unavailable. Use the buttons to continue.",
        Locale::Es => "El micrófono no está disponible. Usa los botones para continuar.",
    }
}

#[must_use]
pub const fn took_too_long(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "That took too long. Say a grade or try again.",
        Locale::Es => "Tardó demasiado. Di una nota o inténtalo de nuevo.",
    }
}

/// Spoken summary of a failed call
#[must_use]
pub fn call_failed(failure: &CallFailure, locale: Locale) -> String {
    match (failure.kind, locale) {
        (FailureKind::ReviewerNotReady, Locale::En) => {
            "Anki isn't showing a card right now. Open the reviewer and try again.".to_string()
        }
        (FailureKind::ReviewerNotReady, Locale::Es) => {
            "Anki no está mostrando una tarjeta. Abre el repaso e inténtalo de nuevo.".to_string()
        }
        (FailureKind::Network, Locale::En) => "I can't reach the server right now.".to_string(),
        (FailureKind::Network, Locale::Es) => "No puedo conectar con el servidor.".to_string(),
        (FailureKind::NotFound | FailureKind::Backend, Locale::En) => {
            format!("Something went wrong: {}", failure.message)
        }
        (FailureKind::NotFound | FailureKind::Backend, Locale::Es) => {
            format!("Algo salió mal: {}", failure.message)
        }
    }
}

/// Explanation followed by the grader's suggested ease, if any
#[must_use]
pub fn explanation(grading: &Grading, locale: Locale) -> String {
    let mut text = grading.explanation.trim().to_string();

    if let Some(ease) = grading.suggested_ease() {
        let name = ease_name(ease, locale);
        let hint = match locale {
            Locale::En => format!("Suggested grade: {name}."),
            Locale::Es => format!("Nota sugerida: {name}."),
        };
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(&hint);
    }

    text
}
