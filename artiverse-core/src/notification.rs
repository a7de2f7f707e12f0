//! Transactional e-mail: the `Mailer` seam and the message templates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use artiverse_order::checkout::is_valid_email;
use artiverse_order::{Order, OrderStatus};
use artiverse_shared::money::format_cents;
use artiverse_shared::Masked;

use crate::identity::User;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> CoreResult<()>;
}

/// Writes messages to the log instead of delivering them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> CoreResult<()> {
        tracing::info!(
            "Email (not delivered) to {}: {}",
            Masked(message.to.as_str()),
            message.subject
        );
        tracing::debug!("Email body:\n{}", message.text);
        Ok(())
    }
}

/// Contact form submission relayed to the gallery inbox
#[derive(Debug, Clone, Deserialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactMessage {
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() || self.name.chars().count() > 100 {
            return Err(CoreError::Validation("name must be 1-100 characters".into()));
        }
        if !is_valid_email(self.email.trim()) {
            return Err(CoreError::Validation("email is invalid".into()));
        }
        if self.subject.trim().is_empty() || self.subject.chars().count() > 200 {
            return Err(CoreError::Validation("subject must be 1-200 characters".into()));
        }
        let len = self.message.trim().chars().count();
        if !(10..=5000).contains(&len) {
            return Err(CoreError::Validation("message must be 10-5000 characters".into()));
        }
        Ok(())
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Message builders. `gallery` is the storefront name used in subjects.
pub mod templates {
    use super::*;

    fn wrap(title: &str, body_html: &str) -> String {
        format!(
            "<!doctype html><html><body style=\"font-family:Georgia,serif;color:#222\">\
             <h2>{}</h2>{}</body></html>",
            escape_html(title),
            body_html
        )
    }

    fn item_lines(order: &Order) -> (String, String) {
        let mut text = String::new();
        let mut html = String::from("<ul>");
        for item in &order.items {
            let line = format!(
                "{} x {}{} - {}",
                item.quantity,
                item.title,
                item.artist_name.as_deref().map(|a| format!(" by {}", a)).unwrap_or_default(),
                format_cents(item.line_total_cents, &order.currency)
            );
            text.push_str(&format!("  {}\n", line));
            html.push_str(&format!("<li>{}</li>", escape_html(&line)));
        }
        html.push_str("</ul>");
        (text, html)
    }

    pub fn welcome(gallery: &str, user: &User) -> EmailMessage {
        let subject = format!("Welcome to {}", gallery);
        let text = format!(
            "Hi {},\n\nYour {} account is ready. Browse the collection and save the pieces you love.\n",
            user.name, gallery
        );
        let html = wrap(
            &subject,
            &format!(
                "<p>Hi {},</p><p>Your {} account is ready. Browse the collection and save the pieces you love.</p>",
                escape_html(&user.name),
                escape_html(gallery)
            ),
        );
        EmailMessage { to: user.email.clone(), subject, text, html, reply_to: None }
    }

    pub fn order_confirmation(gallery: &str, order: &Order) -> EmailMessage {
        let subject = format!("{}: order {} received", gallery, order.order_number);
        let (items_text, items_html) = item_lines(order);
        let total = format_cents(order.total_cents, &order.currency);
        let text = format!(
            "Hi {},\n\nThank you for your order {}.\n\n{}\nSubtotal: {}\nDiscount: {}\nShipping: {}\nTax: {}\nTotal: {}\n\nWe will let you know when it ships.\n",
            order.customer.name,
            order.order_number,
            items_text,
            format_cents(order.subtotal_cents, &order.currency),
            format_cents(order.discount_cents, &order.currency),
            format_cents(order.shipping_cents, &order.currency),
            format_cents(order.tax_cents, &order.currency),
            total
        );
        let html = wrap(
            &subject,
            &format!(
                "<p>Hi {},</p><p>Thank you for your order <strong>{}</strong>.</p>{}<p><strong>Total: {}</strong></p>",
                escape_html(&order.customer.name),
                escape_html(&order.order_number),
                items_html,
                escape_html(&total)
            ),
        );
        EmailMessage { to: order.customer.email.clone(), subject, text, html, reply_to: None }
    }

    pub fn payment_received(gallery: &str, order: &Order) -> EmailMessage {
        let subject = format!("{}: payment received for {}", gallery, order.order_number);
        let total = format_cents(order.total_cents, &order.currency);
        let text = format!(
            "Hi {},\n\nWe received your payment of {} for order {}. Your artwork is being prepared.\n",
            order.customer.name, total, order.order_number
        );
        let html = wrap(
            &subject,
            &format!(
                "<p>Hi {},</p><p>We received your payment of <strong>{}</strong> for order {}. Your artwork is being prepared.</p>",
                escape_html(&order.customer.name),
                escape_html(&total),
                escape_html(&order.order_number)
            ),
        );
        EmailMessage { to: order.customer.email.clone(), subject, text, html, reply_to: None }
    }

    /// Customer-facing status mail. Internal steps (Paid via admin,
    /// Processing) send nothing.
    pub fn status_update(gallery: &str, order: &Order) -> Option<EmailMessage> {
        let sentence = match order.status {
            OrderStatus::Shipped => "has shipped and is on its way to you",
            OrderStatus::Delivered => "has been delivered. We hope you enjoy it",
            OrderStatus::Cancelled => "has been cancelled",
            OrderStatus::Refunded => "has been refunded",
            _ => return None,
        };
        let subject = format!("{}: order {} update", gallery, order.order_number);
        let text = format!("Hi {},\n\nYour order {} {}.\n", order.customer.name, order.order_number, sentence);
        let html = wrap(
            &subject,
            &format!(
                "<p>Hi {},</p><p>Your order {} {}.</p>",
                escape_html(&order.customer.name),
                escape_html(&order.order_number),
                sentence
            ),
        );
        Some(EmailMessage { to: order.customer.email.clone(), subject, text, html, reply_to: None })
    }

    pub fn admin_new_order(gallery: &str, inbox: &str, order: &Order) -> EmailMessage {
        let subject = format!("[{}] New order {}", gallery, order.order_number);
        let (items_text, items_html) = item_lines(order);
        let total = format_cents(order.total_cents, &order.currency);
        let text = format!(
            "New order {} from {} ({} items, {}).\n\n{}",
            order.order_number,
            order.customer.name,
            order.item_count(),
            total,
            items_text
        );
        let html = wrap(
            &subject,
            &format!(
                "<p>New order <strong>{}</strong> from {} ({} items, {}).</p>{}",
                escape_html(&order.order_number),
                escape_html(&order.customer.name),
                order.item_count(),
                escape_html(&total),
                items_html
            ),
        );
        EmailMessage {
            to: inbox.to_string(),
            subject,
            text,
            html,
            reply_to: Some(order.customer.email.clone()),
        }
    }

    pub fn contact_relay(gallery: &str, inbox: &str, contact: &ContactMessage) -> EmailMessage {
        let subject = format!("[{} contact] {}", gallery, contact.subject.trim());
        let text = format!(
            "From: {} <{}>\n\n{}\n",
            contact.name.trim(),
            contact.email.trim(),
            contact.message.trim()
        );
        let html = wrap(
            &subject,
            &format!(
                "<p>From: {} &lt;{}&gt;</p><p style=\"white-space:pre-wrap\">{}</p>",
                escape_html(contact.name.trim()),
                escape_html(contact.email.trim()),
                escape_html(contact.message.trim())
            ),
        );
        EmailMessage {
            to: inbox.to_string(),
            subject,
            text,
            html,
            reply_to: Some(contact.email.trim().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use artiverse_order::{Address, CustomerInfo, OrderItem, PaymentStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn order(status: OrderStatus) -> Order {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Order {
            id,
            order_number: "AG-20261019-ABC123".into(),
            user_id: None,
            customer: CustomerInfo { name: "Ada <3".into(), email: "ada@example.com".into(), phone: None },
            shipping_address: Address {
                line1: "1 Row".into(),
                line2: None,
                city: "London".into(),
                region: None,
                postal_code: "N1".into(),
                country: "GB".into(),
            },
            items: vec![OrderItem {
                id: Uuid::new_v4(),
                order_id: id,
                artwork_id: Uuid::new_v4(),
                title: "Blue Hour".into(),
                artist_name: Some("Mira Okafor".into()),
                unit_price_cents: 125_000,
                quantity: 1,
                line_total_cents: 125_000,
            }],
            subtotal_cents: 125_000,
            discount_cents: 0,
            shipping_cents: 0,
            tax_cents: 10_000,
            total_cents: 135_000,
            currency: "USD".into(),
            status,
            payment_status: PaymentStatus::Unpaid,
            payment_reference: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_order_confirmation() {
        let msg = templates::order_confirmation("Artiverse Galleria", &order(OrderStatus::Pending));
        assert_eq!(msg.to, "ada@example.com");
        assert!(msg.subject.contains("AG-20261019-ABC123"));
        assert!(msg.text.contains("Blue Hour by Mira Okafor"));
        assert!(msg.text.contains("USD 1,350.00"));
        // Customer-provided text is escaped in HTML.
        assert!(msg.html.contains("Ada &lt;3"));
        assert!(!msg.html.contains("Ada <3"));
    }

    #[test]
    fn test_status_update_only_for_customer_visible_states() {
        assert!(templates::status_update("G", &order(OrderStatus::Processing)).is_none());
        let shipped = templates::status_update("G", &order(OrderStatus::Shipped)).unwrap();
        assert!(shipped.text.contains("has shipped"));
    }

    #[test]
    fn test_admin_alert_and_welcome() {
        let alert = templates::admin_new_order("G", "orders@gallery.test", &order(OrderStatus::Pending));
        assert_eq!(alert.to, "orders@gallery.test");
        assert_eq!(alert.reply_to.as_deref(), Some("ada@example.com"));

        let user = User::new("bea@example.com", "Bea", String::new(), Role::Customer);
        let welcome = templates::welcome("G", &user);
        assert_eq!(welcome.to, "bea@example.com");
        assert!(welcome.subject.contains("Welcome"));
    }

    #[test]
    fn test_contact_validation_and_relay() {
        let contact = ContactMessage {
            name: "Sam".into(),
            email: "sam@example.com".into(),
            subject: "Commission".into(),
            message: "Do you take commissions?".into(),
        };
        assert!(contact.validate().is_ok());
        let relay = templates::contact_relay("G", "hello@gallery.test", &contact);
        assert_eq!(relay.to, "hello@gallery.test");
        assert_eq!(relay.reply_to.as_deref(), Some("sam@example.com"));

        let short = ContactMessage { message: "hi".into(), ..contact.clone() };
        assert!(short.validate().is_err());
        let bad = ContactMessage { email: "sam".into(), ..contact };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_everything() {
        let msg = templates::payment_received("G", &order(OrderStatus::Paid));
        assert!(LogMailer.send(&msg).await.is_ok());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&'</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;");
    }
}
