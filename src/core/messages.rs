//! Patient-facing WhatsApp texts.

use crate::config::toml_config::AppConfig;
use crate::domain::model::{Appointment, Slot};

#[derive(Debug, Clone)]
pub struct Templates {
    contact_phone: String,
    signature: String,
    reminder_offsets: Vec<i64>,
}

impl Templates {
    pub fn new(
        contact_phone: impl Into<String>,
        signature: impl Into<String>,
        reminder_offsets: Vec<i64>,
    ) -> Self {
        Self {
            contact_phone: contact_phone.into(),
            signature: signature.into(),
            reminder_offsets,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.clinic.contact_phone,
            &config.clinic.signature,
            config.reminders.offsets_days.clone(),
        )
    }

    /// "7, 5, 3 dias e 24h antes" for the default offsets.
    pub fn reminder_schedule(&self) -> String {
        let mut offsets = self.reminder_offsets.clone();
        offsets.sort_unstable_by(|a, b| b.cmp(a));
        offsets.dedup();

        let day_before = offsets.contains(&1);
        let days: Vec<String> = offsets
            .iter()
            .filter(|d| **d != 1)
            .map(|d| d.to_string())
            .collect();

        match (days.is_empty(), day_before) {
            (false, true) => format!("{} dias e 24h antes", days.join(", ")),
            (false, false) => format!("{} dias antes", days.join(", ")),
            (true, _) => "24h antes".to_string(),
        }
    }

    pub fn booking_confirmation(&self, appointment: &Appointment, guidance: &str) -> String {
        let priority = if appointment.is_elderly() {
            format!(
                "\n👵 Idade: {} anos (Atendimento Prioritário)",
                appointment.age
            )
        } else {
            String::new()
        };

        let audio = match &appointment.audio_url {
            Some(url) if appointment.is_elderly() => format!(
                "\n\n🔊 ÁUDIO ESPECIAL PARA VOCÊ\n\n\
                 Olá {}! Como você tem {} anos, preparamos um áudio explicativo sobre sua consulta de {}.\n\n\
                 🎧 Ouça aqui: {}\n\n\
                 👵👴 Atendimento preferencial garantido!",
                appointment.patient, appointment.age, appointment.exam, url
            ),
            _ => String::new(),
        };

        format!(
            "✅ AGENDAMENTO CONFIRMADO\n\n\
             Olá, {}!\n\n\
             Sua consulta foi agendada:\n\
             📅 Data: {}\n\
             ⏰ Horário: {}\n\
             🏥 Local: {}\n\
             👨‍⚕️ Especialidade: {}{}{}\n\n\
             {}\n\n\
             📌 Lembretes automáticos:\n   • {}\n\n\
             Responda:\n\
             1 - Confirmar\n\
             2 - Cancelar",
            appointment.patient,
            appointment.date,
            appointment.time,
            appointment.clinic,
            appointment.exam,
            priority,
            audio,
            guidance.trim(),
            self.reminder_schedule()
        )
    }

    /// Spoken script for patients 60 and over. No emoji.
    pub fn elderly_audio_script(&self, appointment: &Appointment) -> String {
        format!(
            "Olá {}! Este é um áudio especial do sistema de agendamentos do SUS.\n\
             Sua consulta de {} foi agendada com sucesso.\n\
             A consulta será no dia {}, às {}, no local {}.\n\
             Como você tem {} anos, você tem direito a atendimento prioritário.\n\
             Anote o que você deve levar: documento de identidade, RG ou CPF. Cartão do SUS. \
             Exames anteriores, se tiver. Lista de remédios que você toma.\n\
             Importante: chegue 15 minutos antes do horário.\n\
             Você vai receber lembretes automáticos {}.\n\
             Se tiver alguma dúvida, ligue para o telefone {}.\n\
             Até logo e cuide bem da sua saúde!",
            appointment.patient,
            appointment.exam,
            appointment.date,
            appointment.time,
            appointment.clinic,
            appointment.age,
            self.reminder_schedule(),
            self.contact_phone
        )
    }

    pub fn reminder(&self, slot: &Slot, days_left: i64) -> String {
        let (urgency, checklist) = match days_left {
            1 => (
                "⚠️ SUA CONSULTA É AMANHÃ!".to_string(),
                "\n\n⚠️ LEMBRE-SE DE LEVAR:\n\
                 • Cartão SUS\n\
                 • Documento com foto\n\
                 • Exames anteriores\n\
                 • Lista de medicamentos\n\n\
                 Chegue 15 minutos antes!",
            ),
            3 => (
                "⏰ Faltam apenas 3 dias!".to_string(),
                "\n\n💡 PREPARE-SE:\n\
                 • Organize seus documentos\n\
                 • Separe exames anteriores\n\
                 • Anote suas dúvidas para o médico",
            ),
            d if d < 3 => (format!("⏰ Faltam apenas {} dias!", d), ""),
            d => (format!("Faltam {} dias para sua consulta.", d), ""),
        };

        format!(
            "🔔 LEMBRETE DE CONSULTA\n\n\
             Olá, {}!\n\n\
             {}\n\n\
             Sua consulta de {} está marcada para:\n\
             📅 Data: {}\n\
             ⏰ Horário: {}\n\
             🏥 Local: {}{}\n\n\
             Responda:\n\
             1 - Confirmar presença\n\
             2 - Preciso cancelar\n\n\
             {}",
            slot.patient,
            urgency,
            slot.exam,
            slot.date,
            slot.time,
            slot.clinic,
            checklist,
            self.signature
        )
    }

    pub fn presence_confirmed(&self, name: &str) -> String {
        format!(
            "✅ Consulta Confirmada!\n\n\
             Olá, {}!\n\n\
             Sua presença está confirmada.\n\
             📅 Compareça no dia e horário agendados\n\
             📋 Leve documentos e exames anteriores\n\
             ⏰ Chegue 15 minutos antes\n\n\
             Obrigado! 🏥\n{}",
            name, self.signature
        )
    }

    pub fn appointment_cancelled(&self, name: &str) -> String {
        format!(
            "❌ Consulta Cancelada\n\n\
             Olá, {}.\n\n\
             Sua consulta foi cancelada conforme solicitado.\n\
             O horário foi liberado para outros pacientes.\n\n\
             Para reagendar, entre em contato:\n\
             📞 Telefone: {}\n\n\
             {}",
            name, self.contact_phone, self.signature
        )
    }

    /// Answer to a reply on an appointment that no longer holds its slot.
    pub fn already_cancelled(&self, name: &str) -> String {
        format!(
            "ℹ️ Olá, {}. Esta consulta já foi cancelada e o horário foi liberado.\n\n\
             Para reagendar, entre em contato:\n\
             📞 Telefone: {}",
            name, self.contact_phone
        )
    }

    pub fn not_understood(&self) -> String {
        "🤔 Não entendi. Responda:\n1 - Confirmar\n2 - Cancelar".to_string()
    }

    /// Reply to simulator messages that are neither confirm nor cancel.
    pub fn simulator_thanks(&self) -> String {
        "😊 Por nada!\n\nQualquer dúvida, estamos à disposição.\n\nAté logo! 👋".to_string()
    }

    /// Operator notification text for a freed slot.
    pub fn cancellation_notice(patient: &str, exam: &str, date: &str, time: &str) -> String {
        format!(
            "🚨 {} CANCELOU {} em {} às {} - Horário liberado!",
            patient, exam, date, time
        )
    }
}
